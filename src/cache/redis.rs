mod connection;
mod resp;

pub use connection::RedisConnErr;
pub use resp::{Reply, RespParseErr};

#[cfg(feature = "bench")]
pub use resp::parse_reply;

use super::{Cache, Result, ScoreBound, ZAdd};
use crate::config::Redis;
use crate::tweet::Score;
use connection::RedisConn;

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// A command to send to Redis, built up one argument at a time.
#[derive(Debug, Clone, Default)]
pub struct RedisCmd(Vec<Vec<u8>>);

impl RedisCmd {
    pub fn new(name: &str) -> Self {
        Self(vec![name.as_bytes().to_vec()])
    }

    pub fn arg(mut self, arg: impl AsRef<[u8]>) -> Self {
        self.0.push(arg.as_ref().to_vec());
        self
    }

    pub fn args<A: AsRef<[u8]>>(mut self, args: impl IntoIterator<Item = A>) -> Self {
        self.0.extend(args.into_iter().map(|arg| arg.as_ref().to_vec()));
        self
    }
}

/// A fixed-size set of Redis connections shared by everything that talks to Redis.
///
/// Connections are opened lazily and dropped after any transport error; the next command
/// routed to that slot reconnects.
#[derive(Debug, Clone)]
pub struct RedisPool {
    inner: Arc<PoolInner>,
}

#[derive(Debug)]
struct PoolInner {
    redis_cfg: Redis,
    conns: Vec<Mutex<Option<RedisConn>>>,
    next: AtomicUsize,
}

impl RedisPool {
    /// Opens the first connection right away, so a misconfigured Redis stops start-up.
    pub async fn connect(redis_cfg: Redis) -> std::result::Result<Self, RedisConnErr> {
        let first = RedisConn::new(&redis_cfg).await?;
        let mut conns: Vec<_> = (1..*redis_cfg.pool_size).map(|_| Mutex::new(None)).collect();
        conns.insert(0, Mutex::new(Some(first)));
        log::info!(
            "Connected to Redis at {}:{}",
            *redis_cfg.host,
            *redis_cfg.port
        );
        Ok(Self {
            inner: Arc::new(PoolInner {
                redis_cfg,
                conns,
                next: AtomicUsize::new(0),
            }),
        })
    }

    /// `key`, prefixed with the configured namespace.
    pub fn key(&self, key: &str) -> String {
        match &*self.inner.redis_cfg.namespace {
            Some(namespace) => format!("{}:{}", namespace, key),
            None => key.to_string(),
        }
    }

    pub async fn send(&self, cmd: RedisCmd) -> std::result::Result<Reply, RedisConnErr> {
        let idx = self.inner.next.fetch_add(1, Ordering::Relaxed) % self.inner.conns.len();
        let mut slot = self.inner.conns[idx].lock().await;

        let mut conn = match slot.take() {
            Some(conn) => conn,
            None => RedisConn::new(&self.inner.redis_cfg).await?,
        };
        match conn.send(&cmd.0).await {
            Ok(Reply::Error(msg)) => {
                *slot = Some(conn);
                Err(RedisConnErr::ServerErr(msg))
            }
            Ok(reply) => {
                *slot = Some(conn);
                Ok(reply)
            }
            Err(e) => {
                log::warn!("Dropping Redis connection {}: {}", idx, e);
                Err(e)
            }
        }
    }
}

/// `Cache` backed by Redis.
#[derive(Debug, Clone)]
pub struct RedisCache {
    pool: RedisPool,
}

impl RedisCache {
    pub fn new(pool: RedisPool) -> Self {
        Self { pool }
    }

    fn cmd(&self, name: &str, key: &str) -> RedisCmd {
        RedisCmd::new(name).arg(self.pool.key(key))
    }

    async fn integer(&self, cmd: RedisCmd) -> Result<i64> {
        Ok(self.pool.send(cmd).await?.integer()?)
    }

    async fn scored_members(&self, cmd: RedisCmd) -> Result<Vec<(String, Score)>> {
        let items = self.pool.send(cmd).await?.array()?;
        let mut out = Vec::with_capacity(items.len() / 2);
        let mut items = items.into_iter();
        while let (Some(member), Some(score)) = (items.next(), items.next()) {
            let member = member.bulk_string()?.unwrap_or_default();
            out.push((member, parse_score(score)?));
        }
        Ok(out)
    }
}

/// Redis keeps scores as doubles, so a nanosecond score comes back rounded to the nearest
/// one; `TimelineCache` restores exact scores from tweet ids.
fn parse_score(reply: Reply) -> std::result::Result<Score, RedisConnErr> {
    let txt = reply.bulk_string()?.unwrap_or_default();
    txt.parse::<f64>()
        .map(|score| Score(score.round() as i64))
        .map_err(|_| RedisConnErr::InvalidRedisReply(format!("`{}` is not a score", txt)))
}

fn bound_arg(bound: ScoreBound, unbounded: &str) -> String {
    match bound {
        ScoreBound::Inclusive(score) => score.to_string(),
        ScoreBound::Exclusive(score) => format!("({}", score),
        ScoreBound::Unbounded => unbounded.to_string(),
    }
}

#[async_trait]
impl Cache for RedisCache {
    async fn zadd(&self, key: &str, members: &[(Score, String)], mode: ZAdd) -> Result<usize> {
        if members.is_empty() {
            return Ok(0);
        }
        let mut cmd = self.cmd("ZADD", key);
        cmd = match mode {
            ZAdd::Upsert => cmd,
            ZAdd::KeepLower => cmd.arg("LT"),
            ZAdd::KeepHigher => cmd.arg("GT"),
        };
        for (score, member) in members {
            cmd = cmd.arg(score.to_string()).arg(member);
        }
        Ok(self.integer(cmd).await? as usize)
    }

    async fn zrem(&self, key: &str, members: &[String]) -> Result<usize> {
        if members.is_empty() {
            return Ok(0);
        }
        Ok(self.integer(self.cmd("ZREM", key).args(members)).await? as usize)
    }

    async fn zrevrange(&self, key: &str, start: i64, stop: i64) -> Result<Vec<(String, Score)>> {
        let cmd = self
            .cmd("ZREVRANGE", key)
            .arg(start.to_string())
            .arg(stop.to_string())
            .arg("WITHSCORES");
        self.scored_members(cmd).await
    }

    async fn zrevrange_by_score(
        &self,
        key: &str,
        max: ScoreBound,
        min: ScoreBound,
        offset: usize,
        count: usize,
    ) -> Result<Vec<(String, Score)>> {
        let cmd = self
            .cmd("ZREVRANGEBYSCORE", key)
            .arg(bound_arg(max, "+inf"))
            .arg(bound_arg(min, "-inf"))
            .arg("WITHSCORES")
            .arg("LIMIT")
            .arg(offset.to_string())
            .arg(count.to_string());
        self.scored_members(cmd).await
    }

    async fn zscore(&self, key: &str, members: &[String]) -> Result<Vec<Option<Score>>> {
        if members.is_empty() {
            return Ok(Vec::new());
        }
        let replies = self
            .pool
            .send(self.cmd("ZMSCORE", key).args(members))
            .await?
            .array()?;
        Ok(replies
            .into_iter()
            .map(|reply| match reply {
                Reply::Nil => Ok(None),
                score => parse_score(score).map(Some),
            })
            .collect::<std::result::Result<_, _>>()?)
    }

    async fn zcard(&self, key: &str) -> Result<usize> {
        Ok(self.integer(self.cmd("ZCARD", key)).await? as usize)
    }

    async fn zremrangebyrank(&self, key: &str, start: i64, stop: i64) -> Result<usize> {
        let cmd = self
            .cmd("ZREMRANGEBYRANK", key)
            .arg(start.to_string())
            .arg(stop.to_string());
        Ok(self.integer(cmd).await? as usize)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        let cmd = self
            .cmd("PEXPIRE", key)
            .arg(ttl.as_millis().to_string());
        Ok(self.integer(cmd).await? == 1)
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.pool.send(self.cmd("GET", key)).await?.bulk_string()?)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        let mut cmd = self.cmd("SET", key).arg(value);
        if let Some(ttl) = ttl {
            cmd = cmd.arg("PX").arg(ttl.as_millis().to_string());
        }
        self.pool.send(cmd).await?;
        Ok(())
    }

    async fn set_nx(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        let cmd = self
            .cmd("SET", key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(ttl.as_millis().to_string());
        Ok(self.pool.send(cmd).await?.is_ok())
    }

    async fn incr(&self, key: &str) -> Result<i64> {
        self.integer(self.cmd("INCR", key)).await
    }

    async fn del(&self, key: &str) -> Result<bool> {
        Ok(self.integer(self.cmd("DEL", key)).await? > 0)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn scores_come_back_from_doubles() -> std::result::Result<(), RedisConnErr> {
        assert_eq!(parse_score(Reply::Bulk(b"5".to_vec()))?, Score(5));
        let score = parse_score(Reply::Bulk(b"1.7123456781234568e+18".to_vec()))?;
        assert_eq!(score, Score(1_712_345_678_123_456_768));
        Ok(())
    }

    #[test]
    fn score_bounds_use_redis_syntax() {
        assert_eq!(bound_arg(ScoreBound::Exclusive(Score(10)), "+inf"), "(10");
        assert_eq!(bound_arg(ScoreBound::Inclusive(Score(10)), "+inf"), "10");
        assert_eq!(bound_arg(ScoreBound::Unbounded, "-inf"), "-inf");
    }
}
