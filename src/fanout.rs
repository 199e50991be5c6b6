//! Pushing a tweet into its author's followers' home timelines, and taking it back out.
//!
//! Followers are split into chunks of `chunk` ids and up to `batch_parallelism` chunks are
//! pushed at once; inside a chunk the inserts run one after another.  Every insert is
//! retried with backoff.  Followers that still fail are dead-lettered and become the only
//! targets of the tweet's next fan-out job.
mod dead_letter;
mod worker;

pub use dead_letter::{DeadLetters, DueTweet, REDRIVE};
pub use worker::{Disposition, Worker};

use crate::cache::{self, CacheErr};
use crate::config;
use crate::deadline::Deadline;
use crate::error::Error;
use crate::retry::Backoff;
use crate::store::{Graph, Persistence};
use crate::timeline::{PullOnlyIndex, Timeline, TimelineCache};
use crate::tweet::{TweetId, UserId};

use futures::{stream, FutureExt, StreamExt};
use hashbrown::HashSet;
use std::future::Future;
use std::sync::Arc;

/// What a fan-out job did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The tweet was deleted before its job ran.
    Skipped,
    /// The author has too many followers; readers pull the tweet instead.
    PullOnly,
    Pushed { delivered: usize, dead_lettered: usize },
}

pub struct Fanout {
    store: Arc<dyn Persistence>,
    graph: Arc<dyn Graph>,
    timelines: TimelineCache,
    pull_only: PullOnlyIndex,
    dead_letters: DeadLetters,
    fanout_limit: u64,
    chunk: usize,
    batch_parallelism: usize,
    backoff: Backoff,
}

impl Fanout {
    pub fn new(
        store: Arc<dyn Persistence>,
        graph: Arc<dyn Graph>,
        timelines: TimelineCache,
        pull_only: PullOnlyIndex,
        dead_letters: DeadLetters,
        cfg: &config::Fanout,
    ) -> Self {
        Self {
            store,
            graph,
            timelines,
            pull_only,
            dead_letters,
            fanout_limit: *cfg.fanout_limit,
            chunk: (*cfg.chunk).max(1),
            batch_parallelism: (*cfg.batch_parallelism).max(1),
            backoff: Backoff::default(),
        }
    }

    /// Delivers `tweet_id` to its author's timeline and, unless the author has more than
    /// the fan-out limit of followers, to every follower's home timeline.
    ///
    /// Running the same job twice leaves every timeline as running it once did.
    pub async fn fan_out(
        &self,
        tweet_id: &TweetId,
        follower_count: u64,
        deadline: Deadline,
    ) -> Result<Outcome, Error> {
        deadline
            .run(async {
                let tweet = match self.store.get_tweet(tweet_id).await? {
                    Some(tweet) => tweet,
                    None => {
                        log::info!("Tweet {} is gone; nothing to fan out", tweet_id);
                        self.dead_letters.forget(tweet_id).await?;
                        return Ok(Outcome::Skipped);
                    }
                };
                let (author, score) = (tweet.author_id, tweet.score());
                self.timelines
                    .insert(Timeline::Author(author), tweet_id, score)
                    .await?;

                if follower_count > self.fanout_limit {
                    self.pull_only.mark(author, score).await?;
                    log::info!(
                        "Not pushing {} from {}: {} followers is over the limit",
                        tweet_id,
                        author,
                        follower_count
                    );
                    return Ok(Outcome::PullOnly);
                }

                let dead = self.dead_letters.targets(tweet_id).await?;
                let retrying = !dead.is_empty();
                let targets = if retrying {
                    dead
                } else {
                    self.followers(author, Some(self.fanout_limit)).await?
                };

                let failed = self
                    .scatter(&targets, |follower| {
                        self.timelines
                            .insert(Timeline::Home(follower), tweet_id, score)
                    })
                    .await;

                if !failed.is_empty() {
                    self.dead_letters
                        .record(tweet_id, author, follower_count, &failed)
                        .await?;
                }
                if retrying {
                    let failed: HashSet<&UserId> = failed.iter().collect();
                    let reached: Vec<UserId> = targets
                        .iter()
                        .filter(|id| !failed.contains(id))
                        .copied()
                        .collect();
                    self.dead_letters.clear(tweet_id, &reached).await?;
                }

                log::debug!(
                    "Fanned out {} to {} of {} followers",
                    tweet_id,
                    targets.len() - failed.len(),
                    targets.len()
                );
                Ok(Outcome::Pushed {
                    delivered: targets.len() - failed.len(),
                    dead_lettered: failed.len(),
                })
            })
            .await
    }

    /// Removes a deleted tweet from its author's timeline and from the home timeline of
    /// every follower.  Returns how many follower timelines could not be cleaned; readers
    /// drop those entries once they notice the tweet is gone.
    pub async fn scatter_remove(
        &self,
        tweet_id: &TweetId,
        author: UserId,
        deadline: Deadline,
    ) -> Result<usize, Error> {
        deadline
            .run(async {
                self.timelines
                    .remove(Timeline::Author(author), tweet_id)
                    .await?;
                let followers = self.followers(author, None).await?;
                let failed = self
                    .scatter(&followers, |follower| {
                        self.timelines.remove(Timeline::Home(follower), tweet_id)
                    })
                    .await;
                self.dead_letters.forget(tweet_id).await?;
                if !failed.is_empty() {
                    log::warn!(
                        "Tweet {} may linger in {} home timelines",
                        tweet_id,
                        failed.len()
                    );
                }
                Ok(failed.len())
            })
            .await
    }

    /// The author's followers in ascending id order, at most `cap` of them.
    async fn followers(&self, author: UserId, cap: Option<u64>) -> Result<Vec<UserId>, Error> {
        let cap = cap.map_or(usize::MAX, |cap| usize::try_from(cap).unwrap_or(usize::MAX));
        let mut followers = Vec::new();
        let mut after = None;
        while followers.len() < cap {
            let want = self.chunk.min(cap - followers.len());
            let page = self.graph.followers(author, after, want).await?;
            let exhausted = page.len() < want;
            after = page.last().copied();
            followers.extend(page);
            if exhausted || after.is_none() {
                break;
            }
        }
        Ok(followers)
    }

    /// Runs `op` for every target, chunked and in parallel batches, and returns the targets
    /// it kept failing for.
    async fn scatter<T, F, Fut>(&self, targets: &[UserId], op: F) -> Vec<UserId>
    where
        T: Send,
        F: Fn(UserId) -> Fut + Sync,
        Fut: Future<Output = cache::Result<T>> + Send,
    {
        let batches: Vec<Vec<UserId>> = targets.chunks(self.chunk).map(<[UserId]>::to_vec).collect();
        stream::iter(batches)
            .map(|batch| self.scatter_batch(batch, &op).boxed())
            .buffer_unordered(self.batch_parallelism)
            .concat()
            .await
    }

    async fn scatter_batch<T, F, Fut>(&self, batch: Vec<UserId>, op: &F) -> Vec<UserId>
    where
        F: Fn(UserId) -> Fut,
        Fut: Future<Output = cache::Result<T>>,
    {
        let mut failed = Vec::new();
        for follower in batch {
            if let Err(e) = self.backoff.retry(|| op(follower), |_: &CacheErr| true).await {
                log::warn!("Giving up on the timeline of {} for now: {}", follower, e);
                failed.push(follower);
            }
        }
        failed
    }
}
