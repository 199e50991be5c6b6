//! Followers a fan-out could not reach, kept until a later job reaches them.
//!
//! Per tweet there is a set `fanout:dead:{tweet}` of follower ids, the job's author and
//! follower count at `fanout:dead:{tweet}:job`, and a failure counter at
//! `fanout:dead:{tweet}:attempts`.  The index `fanout:dead` scores each tweet by the
//! time (ns since the epoch) its followers are next due for a re-drive.
use crate::cache::{self, Cache, ScoreBound, ZAdd};
use crate::retry::Backoff;
use crate::tweet::{Score, TweetId, UserId};

use std::sync::Arc;
use std::time::Duration;

/// Spacing between re-drives of the same tweet: 30 s, doubling up to an hour.  After
/// `retries` failed re-drives the followers are given up on.
pub const REDRIVE: Backoff = Backoff {
    base: Duration::from_secs(30),
    cap: Duration::from_secs(60 * 60),
    retries: 8,
};

/// Dead letters outlive every re-drive they could get.
const RECORD_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// A tweet whose dead-lettered followers are due for another attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct DueTweet {
    pub tweet_id: TweetId,
    pub author_id: UserId,
    pub follower_count: u64,
    /// Failed fan-outs recorded so far.
    pub attempts: u32,
}

#[derive(Clone)]
pub struct DeadLetters {
    cache: Arc<dyn Cache>,
}

impl DeadLetters {
    pub const INDEX: &'static str = "fanout:dead";

    pub fn new(cache: Arc<dyn Cache>) -> Self {
        Self { cache }
    }

    fn key(tweet_id: &TweetId) -> String {
        format!("{}:{}", Self::INDEX, tweet_id)
    }

    fn job_key(tweet_id: &TweetId) -> String {
        format!("{}:{}:job", Self::INDEX, tweet_id)
    }

    fn attempts_key(tweet_id: &TweetId) -> String {
        format!("{}:{}:attempts", Self::INDEX, tweet_id)
    }

    /// Adds `followers` to the tweet's dead letters and schedules the next re-drive.
    pub async fn record(
        &self,
        tweet_id: &TweetId,
        author_id: UserId,
        follower_count: u64,
        followers: &[UserId],
    ) -> cache::Result<()> {
        if followers.is_empty() {
            return Ok(());
        }
        let key = Self::key(tweet_id);
        let members: Vec<(Score, String)> = followers
            .iter()
            .map(|id| (Score(id.0), id.to_string()))
            .collect();
        self.cache.zadd(&key, &members, ZAdd::Upsert).await?;
        self.cache.expire(&key, RECORD_TTL).await?;
        self.cache
            .set(
                &Self::job_key(tweet_id),
                &format!("{}:{}", author_id, follower_count),
                Some(RECORD_TTL),
            )
            .await?;

        let attempts_key = Self::attempts_key(tweet_id);
        let attempts = self.cache.incr(&attempts_key).await?;
        self.cache.expire(&attempts_key, RECORD_TTL).await?;
        let attempts = u32::try_from(attempts).unwrap_or(u32::MAX);
        self.schedule(tweet_id, attempts.saturating_sub(1)).await?;
        log::warn!(
            "{} followers of {} dead-lettered for tweet {} (attempt {})",
            followers.len(),
            author_id,
            tweet_id,
            attempts
        );
        Ok(())
    }

    /// Pushes the tweet's next re-drive back by the delay for its `attempt`th retry.
    pub async fn schedule(&self, tweet_id: &TweetId, attempt: u32) -> cache::Result<()> {
        let delay = i64::try_from(REDRIVE.delay(attempt).as_nanos()).unwrap_or(i64::MAX);
        let due = Score(Score::now().0.saturating_add(delay));
        self.cache
            .zadd(Self::INDEX, &[(due, tweet_id.0.clone())], ZAdd::Upsert)
            .await?;
        Ok(())
    }

    /// The followers still waiting for the tweet.
    pub async fn targets(&self, tweet_id: &TweetId) -> cache::Result<Vec<UserId>> {
        let members = self.cache.zrevrange(&Self::key(tweet_id), 0, -1).await?;
        let mut targets: Vec<UserId> = members
            .into_iter()
            .filter_map(|(id, _)| id.parse().ok())
            .collect();
        targets.sort_unstable();
        Ok(targets)
    }

    /// Removes followers that have since received the tweet; once none are left, the
    /// tweet's record is dropped.
    pub async fn clear(&self, tweet_id: &TweetId, followers: &[UserId]) -> cache::Result<()> {
        let key = Self::key(tweet_id);
        if !followers.is_empty() {
            let members: Vec<String> = followers.iter().map(UserId::to_string).collect();
            self.cache.zrem(&key, &members).await?;
        }
        if self.cache.zcard(&key).await? == 0 {
            self.forget(tweet_id).await?;
        }
        Ok(())
    }

    pub async fn forget(&self, tweet_id: &TweetId) -> cache::Result<()> {
        self.cache.del(&Self::key(tweet_id)).await?;
        self.cache.del(&Self::job_key(tweet_id)).await?;
        self.cache.del(&Self::attempts_key(tweet_id)).await?;
        self.cache
            .zrem(Self::INDEX, &[tweet_id.0.clone()])
            .await?;
        Ok(())
    }

    /// Up to `limit` tweets due for a re-drive at `now`.
    pub async fn due(&self, now: Score, limit: usize) -> cache::Result<Vec<DueTweet>> {
        let due = self
            .cache
            .zrevrange_by_score(
                Self::INDEX,
                ScoreBound::Inclusive(now),
                ScoreBound::Unbounded,
                0,
                limit,
            )
            .await?;

        let mut tweets = Vec::with_capacity(due.len());
        for (tweet_id, _) in due {
            let tweet_id = TweetId(tweet_id);
            let job = self.cache.get(&Self::job_key(&tweet_id)).await?;
            let parsed = job.as_deref().and_then(|job| {
                let (author, count) = job.split_once(':')?;
                Some((author.parse::<UserId>().ok()?, count.parse::<u64>().ok()?))
            });
            let (author_id, follower_count) = match parsed {
                Some(parsed) => parsed,
                None => {
                    log::warn!("Dropping dead letters of {} with no job record", tweet_id);
                    self.forget(&tweet_id).await?;
                    continue;
                }
            };
            let attempts = self
                .cache
                .get(&Self::attempts_key(&tweet_id))
                .await?
                .and_then(|n| n.parse().ok())
                .unwrap_or(0);
            tweets.push(DueTweet {
                tweet_id,
                author_id,
                follower_count,
                attempts,
            });
        }
        Ok(tweets)
    }
}
