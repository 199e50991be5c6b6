mod err;
pub use err::RedisConnErr;

use super::resp::{self, Reply, RespParseErr};
use crate::config::Redis;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

type Result<T> = std::result::Result<T, RedisConnErr>;

/// A single request/reply connection to Redis.
#[derive(Debug)]
pub(crate) struct RedisConn {
    stream: TcpStream,
    addr: String,
    redis_input: Vec<u8>,
    cursor: usize,
}

impl RedisConn {
    pub(crate) async fn new(redis_cfg: &Redis) -> Result<Self> {
        let addr = format!("{}:{}", *redis_cfg.host, *redis_cfg.port);
        let stream = TcpStream::connect(&addr)
            .await
            .map_err(|e| RedisConnErr::with_addr(&addr, e))?;
        stream
            .set_nodelay(true)
            .map_err(|e| RedisConnErr::with_addr(&addr, e))?;

        let mut conn = Self {
            stream,
            addr,
            redis_input: vec![0_u8; 5000],
            cursor: 0,
        };
        if let Some(password) = &*redis_cfg.password {
            conn.auth_connection(password).await?;
        }
        conn.validate_connection().await?;
        if let Some(db) = *redis_cfg.db {
            let reply = conn.send(&["SELECT", db.to_string().as_str()]).await?;
            if !reply.is_ok() {
                Err(RedisConnErr::InvalidRedisReply(format!("{:?}", reply)))?
            }
        }
        Ok(conn)
    }

    /// Sends one command and waits for its reply.
    ///
    /// Error replies come back as `Reply::Error`; only transport and protocol failures are
    /// `Err`s, and after one of those the connection must not be reused.
    pub(crate) async fn send<A: AsRef<[u8]>>(&mut self, args: &[A]) -> Result<Reply> {
        self.stream.write_all(&resp::encode_cmd(args)).await?;
        self.read_reply().await
    }

    async fn read_reply(&mut self) -> Result<Reply> {
        loop {
            match resp::parse_reply(&self.redis_input[..self.cursor]) {
                Ok((reply, used)) => {
                    self.redis_input.copy_within(used..self.cursor, 0);
                    self.cursor -= used;
                    return Ok(reply);
                }
                Err(RespParseErr::Incomplete) => (),
                Err(e) => Err(e)?,
            }

            if self.cursor == self.redis_input.len() {
                self.redis_input.resize(self.redis_input.len() * 2, 0);
            }
            match self.stream.read(&mut self.redis_input[self.cursor..]).await? {
                0 => Err(RedisConnErr::Closed(self.addr.clone()))?,
                n => self.cursor += n,
            }
        }
    }

    async fn auth_connection(&mut self, pass: &str) -> Result<()> {
        match self.send(&["AUTH", pass]).await {
            Ok(reply) if reply.is_ok() => Ok(()),
            Ok(Reply::Error(_)) => Err(RedisConnErr::IncorrectPassword),
            Ok(other) => Err(RedisConnErr::InvalidRedisReply(format!("{:?}", other))),
            Err(RedisConnErr::ParseErr(RespParseErr::InvalidLineStart(_))) => {
                Err(RedisConnErr::NotRedis(self.addr.clone()))
            }
            Err(e) => Err(e),
        }
    }

    async fn validate_connection(&mut self) -> Result<()> {
        match self.send(&["PING"]).await {
            Ok(Reply::Status(pong)) if pong == "PONG" => Ok(()),
            Ok(Reply::Error(e)) if e.starts_with("NOAUTH") => Err(RedisConnErr::MissingPassword),
            Ok(other) => Err(RedisConnErr::InvalidRedisReply(format!("{:?}", other))),
            Err(RedisConnErr::ParseErr(RespParseErr::InvalidLineStart(_))) => {
                Err(RedisConnErr::NotRedis(self.addr.clone()))
            }
            Err(e) => Err(e),
        }
    }
}
