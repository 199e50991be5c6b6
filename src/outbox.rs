//! The outbox sweeper: re-publishes fan-out jobs that were stored but never enqueued, and
//! re-drives tweets whose fan-out left followers behind.
use crate::cache::Cache;
use crate::config;
use crate::error::Error;
use crate::fanout::{DeadLetters, REDRIVE};
use crate::router::Router;
use crate::store::{FollowerCounts, Graph, Persistence};
use crate::tweet::Score;

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Outbox entries and dead-letter records handled per sweep.
const SWEEP_BATCH: usize = 100;

/// What one sweep did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Sweep {
    pub republished: usize,
    pub redriven: usize,
    pub abandoned: usize,
}

pub struct Sweeper {
    store: Arc<dyn Persistence>,
    graph: Arc<dyn Graph>,
    cache: Arc<dyn Cache>,
    router: Router,
    dead_letters: DeadLetters,
    interval: Duration,
    grace: Duration,
}

impl Sweeper {
    pub fn new(
        store: Arc<dyn Persistence>,
        graph: Arc<dyn Graph>,
        cache: Arc<dyn Cache>,
        router: Router,
        cfg: &config::Fanout,
    ) -> Self {
        Self {
            dead_letters: DeadLetters::new(cache.clone()),
            store,
            graph,
            cache,
            router,
            interval: *cfg.outbox_interval,
            grace: *cfg.outbox_grace,
        }
    }

    /// Sweeps every `interval` until `shutdown` flips to `true`.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = interval.tick() => (),
                changed = shutdown.changed() => match changed {
                    Ok(()) if !*shutdown.borrow() => continue,
                    _ => break,
                },
            }
            match self.sweep_once().await {
                Ok(sweep) if sweep == Sweep::default() => (),
                Ok(sweep) => log::info!("Outbox sweep: {:?}", sweep),
                Err(e) => log::warn!("Outbox sweep failed: {}", e),
            }
        }
        log::info!("Outbox sweeper stopped");
    }

    pub async fn sweep_once(&self) -> Result<Sweep, Error> {
        let mut sweep = Sweep::default();
        let counts = FollowerCounts::new(&*self.cache, &*self.graph);

        let grace = chrono::Duration::from_std(self.grace).unwrap_or_else(|_| chrono::Duration::zero());
        for entry in self
            .store
            .outbox_pending(Utc::now() - grace, SWEEP_BATCH)
            .await?
        {
            let attempt = self.store.outbox_bump(&entry.tweet_id).await?;
            let follower_count = counts.get(entry.author_id).await?;
            self.router
                .redrive(&entry.tweet_id, entry.author_id, follower_count, attempt)
                .await?;
            self.store.outbox_ack(&entry.tweet_id).await?;
            log::info!(
                "Re-published fan-out of {} (stored {}, attempt {})",
                entry.tweet_id,
                entry.created_at,
                attempt
            );
            sweep.republished += 1;
        }

        for due in self.dead_letters.due(Score::now(), SWEEP_BATCH).await? {
            if due.attempts > REDRIVE.retries {
                log::error!(
                    "Giving up on dead-lettered followers of {} after {} attempts",
                    due.tweet_id,
                    due.attempts
                );
                self.dead_letters.forget(&due.tweet_id).await?;
                sweep.abandoned += 1;
                continue;
            }
            self.router
                .redrive(&due.tweet_id, due.author_id, due.follower_count, due.attempts)
                .await?;
            self.dead_letters
                .schedule(&due.tweet_id, due.attempts)
                .await?;
            sweep.redriven += 1;
        }
        Ok(sweep)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::broker::{MemoryBroker, Queue};
    use crate::cache::MemoryCache;
    use crate::store::MemoryStore;
    use crate::tweet::{NewTweet, TweetId, UserId};

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    struct Fixture {
        store: Arc<MemoryStore>,
        cache: Arc<MemoryCache>,
        broker: Arc<MemoryBroker>,
        sweeper: Sweeper,
    }

    fn fixture() -> Fixture {
        let cfg = config::Fanout {
            outbox_grace: config::OutboxGrace(Duration::ZERO),
            ..config::Fanout::default()
        };
        let store = Arc::new(MemoryStore::new());
        let cache = Arc::new(MemoryCache::new());
        let broker = Arc::new(MemoryBroker::new());
        let sweeper = Sweeper::new(
            store.clone(),
            store.clone(),
            cache.clone(),
            Router::new(broker.clone(), 10_000),
            &cfg,
        );
        Fixture {
            store,
            cache,
            broker,
            sweeper,
        }
    }

    async fn stored_tweet(store: &MemoryStore, author: i64) -> Result<TweetId, Error> {
        let score = Score(Score::now().0 - 1_000_000_000);
        let new = NewTweet {
            content: "lost job".into(),
            ..NewTweet::default()
        };
        let tweet = new.into_tweet(TweetId::generate(score), UserId(author), score);
        store.put_tweet(&tweet).await?;
        Ok(tweet.id)
    }

    #[tokio::test]
    async fn unpublished_tweets_are_republished_once() -> TestResult {
        let f = fixture();
        f.store.follow(UserId(2), UserId(1));
        let id = stored_tweet(&f.store, 1).await?;

        let sweep = f.sweeper.sweep_once().await?;
        assert_eq!(sweep.republished, 1);
        assert_eq!(f.store.outbox_len(), 0);
        let jobs = f.broker.peek(Queue::Low);
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].tweet_id, id);
        assert_eq!(jobs[0].attempt, 1);

        assert_eq!(f.sweeper.sweep_once().await?, Sweep::default());
        Ok(())
    }

    #[tokio::test]
    async fn broker_outage_keeps_the_outbox_entry() -> TestResult {
        let f = fixture();
        stored_tweet(&f.store, 1).await?;
        f.broker.set_unavailable(true);
        assert!(f.sweeper.sweep_once().await.is_err());
        assert_eq!(f.store.outbox_len(), 1);

        f.broker.set_unavailable(false);
        assert_eq!(f.sweeper.sweep_once().await?.republished, 1);
        Ok(())
    }

    #[tokio::test]
    async fn due_dead_letters_are_redriven() -> TestResult {
        let f = fixture();
        let dead = DeadLetters::new(f.cache.clone());
        let id = TweetId::from("t1");
        dead.record(&id, UserId(1), 4, &[UserId(3)]).await?;
        dead_letters_due_now(&f.cache, &id).await?;

        let sweep = f.sweeper.sweep_once().await?;
        assert_eq!(sweep.redriven, 1);
        let jobs = f.broker.peek(Queue::Low);
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].tweet_id, id);

        // rescheduled, so not redriven again right away
        assert_eq!(f.sweeper.sweep_once().await?.redriven, 0);
        Ok(())
    }

    #[tokio::test]
    async fn dead_letters_are_abandoned_eventually() -> TestResult {
        let f = fixture();
        let dead = DeadLetters::new(f.cache.clone());
        let id = TweetId::from("t1");
        for _ in 0..=REDRIVE.retries {
            dead.record(&id, UserId(1), 4, &[UserId(3)]).await?;
        }
        dead_letters_due_now(&f.cache, &id).await?;

        assert_eq!(f.sweeper.sweep_once().await?.abandoned, 1);
        assert!(dead.targets(&id).await?.is_empty());
        assert!(f.broker.is_empty());
        Ok(())
    }

    async fn dead_letters_due_now(cache: &MemoryCache, id: &TweetId) -> Result<(), Error> {
        cache
            .zadd(
                DeadLetters::INDEX,
                &[(Score(0), id.0.clone())],
                crate::cache::ZAdd::Upsert,
            )
            .await?;
        Ok(())
    }
}
