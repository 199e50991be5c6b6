use crate::broker::BrokerErr;
use crate::cache::RedisConnErr;
use crate::error::Error;
use std::fmt;

/// Errors that stop the server from starting (or force it to shut down).
pub enum FatalErr {
    Logger(log::SetLoggerError),
    Postgres(Error),
    Redis(RedisConnErr),
    Broker(BrokerErr),
    StdIo(std::io::Error),
    Bind(warp::Error),
    Runtime(tokio::task::JoinError),
    // config errs
    UrlParse(url::ParseError),
    UrlEncoding(std::string::FromUtf8Error),
    ConfigErr(String),
}

impl FatalErr {
    pub fn log(msg: impl fmt::Display) {
        eprintln!("{}", msg);
    }

    pub fn config(
        var: impl fmt::Display,
        value: impl fmt::Display,
        allowed_vals: impl fmt::Display,
    ) -> Self {
        Self::ConfigErr(format!(
            "{0} is set to `{1}`, which is invalid.\n{3:7}{0} must be {2}.",
            var, value, allowed_vals, ""
        ))
    }
}

impl std::error::Error for FatalErr {}
impl fmt::Debug for FatalErr {
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        write!(f, "{}", self)
    }
}

impl fmt::Display for FatalErr {
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        use FatalErr::*;
        write!(
            f,
            "{}",
            match self {
                Logger(e) => format!("{}", e),
                StdIo(e) => format!("{}", e),
                Bind(e) => format!("could not bind the server address.\n{:7}{}", "", e),
                Runtime(e) => format!("a background task failed: {}", e),
                Postgres(e) => format!("could not connect to Postgres.\n{:7}{}", "", e),
                Redis(e) => format!("could not connect to Redis.\n{:7}{}", "", e),
                Broker(e) => format!("could not recover unacked jobs.\n{:7}{}", "", e),
                ConfigErr(e) => e.to_string(),
                UrlParse(e) => format!("could not parse the connection URL.\n{:7}{}", "", e),
                UrlEncoding(e) => format!("could not decode the connection URL.\n{:7}{}", "", e),
            }
        )
    }
}

impl From<Error> for FatalErr {
    fn from(e: Error) -> Self {
        Self::Postgres(e)
    }
}
impl From<RedisConnErr> for FatalErr {
    fn from(e: RedisConnErr) -> Self {
        Self::Redis(e)
    }
}
impl From<std::string::FromUtf8Error> for FatalErr {
    fn from(e: std::string::FromUtf8Error) -> Self {
        Self::UrlEncoding(e)
    }
}
impl From<url::ParseError> for FatalErr {
    fn from(e: url::ParseError) -> Self {
        Self::UrlParse(e)
    }
}
impl From<std::io::Error> for FatalErr {
    fn from(e: std::io::Error) -> Self {
        Self::StdIo(e)
    }
}
impl From<BrokerErr> for FatalErr {
    fn from(e: BrokerErr) -> Self {
        Self::Broker(e)
    }
}
impl From<warp::Error> for FatalErr {
    fn from(e: warp::Error) -> Self {
        Self::Bind(e)
    }
}
impl From<tokio::task::JoinError> for FatalErr {
    fn from(e: tokio::task::JoinError) -> Self {
        Self::Runtime(e)
    }
}
impl From<log::SetLoggerError> for FatalErr {
    fn from(e: log::SetLoggerError) -> Self {
        Self::Logger(e)
    }
}
