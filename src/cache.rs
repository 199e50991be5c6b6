//! The shared cache the core keeps timelines, locks, and counters in.
//!
//! `Cache` exposes the small subset of Redis' sorted-set and key/value commands the core
//! needs.  `RedisCache` talks to a real Redis over our own RESP client; `MemoryCache` keeps
//! everything in-process, for tests and single-node development.
mod err;
mod memory;
mod redis;

pub use err::CacheErr;
pub use memory::MemoryCache;
pub use redis::{RedisCache, RedisCmd, RedisConnErr, RedisPool, Reply, RespParseErr};

#[cfg(feature = "bench")]
pub use redis::parse_reply;

use crate::tweet::Score;

use async_trait::async_trait;
use std::time::Duration;

pub type Result<T> = std::result::Result<T, CacheErr>;

/// How `zadd` treats a member that is already in the set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZAdd {
    Upsert,
    /// Only ever lower an existing member's score (`ZADD LT`).
    KeepLower,
    /// Only ever raise an existing member's score (`ZADD GT`).
    KeepHigher,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreBound {
    Inclusive(Score),
    Exclusive(Score),
    Unbounded,
}

/// Bounds compare like Redis compares them, as doubles.
impl ScoreBound {
    fn admits_below(&self, score: Score) -> bool {
        match self {
            Self::Inclusive(max) => score.rounded() <= max.rounded(),
            Self::Exclusive(max) => score.rounded() < max.rounded(),
            Self::Unbounded => true,
        }
    }

    fn admits_above(&self, score: Score) -> bool {
        match self {
            Self::Inclusive(min) => score.rounded() >= min.rounded(),
            Self::Exclusive(min) => score.rounded() > min.rounded(),
            Self::Unbounded => true,
        }
    }
}

/// Sorted-set and key/value commands, with Redis' semantics.
///
/// Ranks count from the highest score (`zrevrange`) unless the method says otherwise;
/// members with equal scores are ordered by member, descending.  Negative ranks count
/// from the end, as in Redis.
#[async_trait]
pub trait Cache: Send + Sync {
    /// Returns the number of members newly added.
    async fn zadd(&self, key: &str, members: &[(Score, String)], mode: ZAdd) -> Result<usize>;
    async fn zrem(&self, key: &str, members: &[String]) -> Result<usize>;
    /// Members ranked `start..=stop`, highest score first.
    async fn zrevrange(&self, key: &str, start: i64, stop: i64) -> Result<Vec<(String, Score)>>;
    async fn zrevrange_by_score(
        &self,
        key: &str,
        max: ScoreBound,
        min: ScoreBound,
        offset: usize,
        count: usize,
    ) -> Result<Vec<(String, Score)>>;
    async fn zscore(&self, key: &str, members: &[String]) -> Result<Vec<Option<Score>>>;
    async fn zcard(&self, key: &str) -> Result<usize>;
    /// Removes members ranked `start..=stop` counting from the *lowest* score.
    async fn zremrangebyrank(&self, key: &str, start: i64, stop: i64) -> Result<usize>;
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool>;
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()>;
    /// Sets `key` only if it does not exist yet; returns whether it was set.
    async fn set_nx(&self, key: &str, value: &str, ttl: Duration) -> Result<bool>;
    async fn incr(&self, key: &str) -> Result<i64>;
    async fn del(&self, key: &str) -> Result<bool>;
}

/// Resolves Redis-style `start..=stop` ranks (negative ones counting from the end) against
/// a collection of `len` items.
pub(crate) fn rank_bounds(len: usize, start: i64, stop: i64) -> Option<(usize, usize)> {
    let len = len as i64;
    let resolve = |rank: i64| if rank < 0 { len + rank } else { rank };
    let (start, stop) = (resolve(start).max(0), resolve(stop).min(len - 1));
    if len == 0 || start > stop || start >= len {
        None
    } else {
        Some((start as usize, stop as usize))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn rank_bounds_follow_redis() {
        assert_eq!(rank_bounds(10, 0, -1), Some((0, 9)));
        assert_eq!(rank_bounds(10, 0, 3), Some((0, 3)));
        assert_eq!(rank_bounds(10, -3, -1), Some((7, 9)));
        assert_eq!(rank_bounds(10, 5, 100), Some((5, 9)));
        assert_eq!(rank_bounds(10, 0, -11), None);
        assert_eq!(rank_bounds(10, 12, 20), None);
        assert_eq!(rank_bounds(0, 0, -1), None);
    }

    #[test]
    fn score_bounds() {
        assert!(ScoreBound::Exclusive(Score(5)).admits_below(Score(4)));
        assert!(!ScoreBound::Exclusive(Score(5)).admits_below(Score(5)));
        assert!(ScoreBound::Inclusive(Score(5)).admits_above(Score(5)));
        assert!(ScoreBound::Unbounded.admits_above(Score(i64::MIN)));
        // 1_712_345_678_123_456_000 is a double; the next one is 256 further
        let exact = Score(1_712_345_678_123_456_001);
        assert!(ScoreBound::Inclusive(exact).admits_below(Score(1_712_345_678_123_456_100)));
        assert!(!ScoreBound::Exclusive(exact).admits_above(Score(1_712_345_678_123_456_000)));
    }
}
