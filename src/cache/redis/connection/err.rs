use super::super::resp::RespParseErr;
use std::fmt;

#[derive(Debug)]
pub enum RedisConnErr {
    ConnectionErr { addr: String, inner: std::io::Error },
    InvalidRedisReply(String),
    UnknownRedisErr(std::io::Error),
    IncorrectPassword,
    MissingPassword,
    NotRedis(String),
    /// Redis replied with an error (`-ERR ...`) to a well-formed command.
    ServerErr(String),
    ParseErr(RespParseErr),
    Closed(String),
}

impl RedisConnErr {
    pub(crate) fn with_addr<T: AsRef<str>>(address: T, inner: std::io::Error) -> Self {
        Self::ConnectionErr {
            addr: address.as_ref().to_string(),
            inner,
        }
    }
}

impl std::error::Error for RedisConnErr {}

impl fmt::Display for RedisConnErr {
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        use RedisConnErr::*;
        let msg = match self {
            ConnectionErr { addr, inner } => format!(
                "Error connecting to Redis at {}.\n\
                 Connection Error: {}",
                addr, inner
            ),
            InvalidRedisReply(unexpected_reply) => format!(
                "Received an unexpected reply from Redis: `{}`",
                unexpected_reply
            ),
            UnknownRedisErr(io_err) => {
                format!("Unexpected failure communicating with Redis: {}", io_err)
            }
            IncorrectPassword => "Incorrect Redis password.\n \
                                  Please supply the correct password with the REDIS_PASSWORD \
                                  environmental variable."
                .to_string(),
            MissingPassword => "Invalid authentication for Redis.  Redis is configured to require \
                                a password, but you did not provide one. \n\
                                Set a password using the REDIS_PASSWORD environmental variable."
                .to_string(),
            NotRedis(addr) => format!(
                "The server at {} is not a Redis server.  Please update the REDIS_HOST and/or \
                 REDIS_PORT environmental variables and try again.",
                addr
            ),
            ServerErr(msg) => format!("Redis returned an error: {}", msg),
            ParseErr(inner) => format!("Could not parse the reply from Redis: {}", inner),
            Closed(addr) => format!("Redis at {} closed the connection", addr),
        };
        write!(f, "{}", msg)
    }
}

impl From<std::io::Error> for RedisConnErr {
    fn from(e: std::io::Error) -> RedisConnErr {
        RedisConnErr::UnknownRedisErr(e)
    }
}

impl From<RespParseErr> for RedisConnErr {
    fn from(e: RespParseErr) -> RedisConnErr {
        RedisConnErr::ParseErr(e)
    }
}
