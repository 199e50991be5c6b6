//! Durable state the core reads and writes but does not own: tweets, the fan-out outbox,
//! and the follow graph.
mod memory;
mod postgres;

pub use self::postgres::PgStore;
pub use memory::MemoryStore;

use crate::cache::Cache;
use crate::error::Error;
use crate::timeline::Entry;
use crate::tweet::{Score, Tweet, TweetId, UserId};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hashbrown::HashMap;
use std::time::Duration;

pub type Result<T> = std::result::Result<T, Error>;

/// A persisted tweet whose fan-out job has not been confirmed as published.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboxEntry {
    pub tweet_id: TweetId,
    pub author_id: UserId,
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait Persistence: Send + Sync {
    /// Stores `tweet` and its outbox entry atomically.
    ///
    /// A second tweet by the same author with the same `client_id` is a `Conflict`.
    async fn put_tweet(&self, tweet: &Tweet) -> Result<()>;
    async fn get_tweet(&self, id: &TweetId) -> Result<Option<Tweet>>;
    /// The tweets that still exist among `ids`; missing ones are simply absent.
    async fn batch_get_tweets(&self, ids: &[TweetId]) -> Result<HashMap<TweetId, Tweet>>;
    /// The author's newest tweets, newest first: only those ranked below `before` and
    /// scored at least `since`.
    async fn list_author_tweet_ids(
        &self,
        author: UserId,
        since: Option<Score>,
        before: Option<&Entry>,
        limit: usize,
    ) -> Result<Vec<Entry>>;
    /// Returns whether the tweet existed.
    async fn delete_tweet(&self, id: &TweetId) -> Result<bool>;
    async fn outbox_pending(
        &self,
        older_than: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<OutboxEntry>>;
    async fn outbox_ack(&self, id: &TweetId) -> Result<()>;
    /// Records one more publish attempt; returns the new attempt count.
    async fn outbox_bump(&self, id: &TweetId) -> Result<u32>;
}

#[async_trait]
pub trait Graph: Send + Sync {
    /// Followers of `author` in ascending id order, starting after `after`.
    async fn followers(
        &self,
        author: UserId,
        after: Option<UserId>,
        limit: usize,
    ) -> Result<Vec<UserId>>;
    async fn following(&self, user: UserId) -> Result<Vec<UserId>>;
    async fn follower_count(&self, author: UserId) -> Result<u64>;
}

/// Follower counts, cached for a few minutes in front of the graph.
pub struct FollowerCounts<'a> {
    cache: &'a dyn Cache,
    graph: &'a dyn Graph,
}

impl<'a> FollowerCounts<'a> {
    pub const TTL: Duration = Duration::from_secs(5 * 60);

    pub fn new(cache: &'a dyn Cache, graph: &'a dyn Graph) -> Self {
        Self { cache, graph }
    }

    fn key(author: UserId) -> String {
        format!("author:{}:followers", author)
    }

    pub async fn get(&self, author: UserId) -> Result<u64> {
        let key = Self::key(author);
        match self.cache.get(&key).await {
            Ok(Some(count)) => match count.parse() {
                Ok(count) => return Ok(count),
                Err(_) => log::warn!("Ignoring unparseable follower count `{}` at {}", count, key),
            },
            Ok(None) => (),
            Err(e) => log::warn!("Follower count cache unavailable: {}", e),
        }

        let count = self.graph.follower_count(author).await?;
        if let Err(e) = self
            .cache
            .set(&key, &count.to_string(), Some(Self::TTL))
            .await
        {
            log::debug!("Could not cache follower count for {}: {}", author, e);
        }
        Ok(count)
    }
}
