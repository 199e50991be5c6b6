//! Picks the queue for a tweet's fan-out job and publishes it.
use crate::broker::{Broker, BrokerErr, Queue};
use crate::job::{Job, Priority};
use crate::tweet::{TweetId, UserId};

use std::sync::Arc;

#[derive(Clone)]
pub struct Router {
    broker: Arc<dyn Broker>,
    viral_threshold: u64,
}

impl Router {
    pub fn new(broker: Arc<dyn Broker>, viral_threshold: u64) -> Self {
        Self {
            broker,
            viral_threshold,
        }
    }

    /// Viral authors get the high queue so their fan-out is not stuck behind everyone
    /// else's; the low queue is only for re-drives.
    pub fn priority(&self, follower_count: u64) -> Priority {
        if follower_count > self.viral_threshold {
            Priority::High
        } else {
            Priority::Normal
        }
    }

    pub async fn route(
        &self,
        tweet_id: &TweetId,
        author_id: UserId,
        follower_count: u64,
    ) -> Result<Job, BrokerErr> {
        let job = Job::fanout(
            tweet_id.clone(),
            author_id,
            follower_count,
            self.priority(follower_count),
        );
        self.publish(job).await
    }

    /// Publishes another fan-out job for a tweet whose first one was lost or left
    /// followers behind.
    pub async fn redrive(
        &self,
        tweet_id: &TweetId,
        author_id: UserId,
        follower_count: u64,
        attempt: u32,
    ) -> Result<Job, BrokerErr> {
        let mut job = Job::fanout(tweet_id.clone(), author_id, follower_count, Priority::Low);
        job.attempt = attempt;
        self.publish(job).await
    }

    async fn publish(&self, job: Job) -> Result<Job, BrokerErr> {
        let queue = Queue::for_priority(job.priority);
        self.broker.publish(queue, &job).await?;
        log::debug!(
            "Published fan-out job {} for tweet {} to {}",
            job.id,
            job.tweet_id,
            queue
        );
        Ok(job)
    }
}
