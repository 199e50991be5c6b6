//! Accepting new tweets: validate, stamp, persist, then hand off to the router.
//!
//! Ingest returns as soon as the tweet is stored and its fan-out job is published.  The
//! tweet and its outbox entry are written in one transaction, so a job that could not be
//! published is re-driven later by the outbox sweeper.
use crate::cache::Cache;
use crate::deadline::Deadline;
use crate::error::Error;
use crate::retry::Backoff;
use crate::router::Router;
use crate::store::{FollowerCounts, Graph, Persistence};
use crate::tweet::{NewTweet, Score, Tweet, TweetId, UserId};

use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// How long an identical submission by the same author is refused while the first one
/// is being stored.
const LOCK_TTL: Duration = Duration::from_secs(30);

/// Three attempts at storing a tweet before giving up.
const PERSIST: Backoff = Backoff {
    base: Duration::from_millis(50),
    cap: Duration::from_secs(2),
    retries: 2,
};

/// Authors whose last stamped score this node remembers.
const CLOCK_AUTHORS: NonZeroUsize = match NonZeroUsize::new(10_000) {
    Some(n) => n,
    None => panic!("CLOCK_AUTHORS must not be zero"),
};

pub struct Ingestor {
    store: Arc<dyn Persistence>,
    graph: Arc<dyn Graph>,
    cache: Arc<dyn Cache>,
    router: Router,
    last_scores: Mutex<LruCache<UserId, Score>>,
}

impl Ingestor {
    pub fn new(
        store: Arc<dyn Persistence>,
        graph: Arc<dyn Graph>,
        cache: Arc<dyn Cache>,
        router: Router,
    ) -> Self {
        Self {
            store,
            graph,
            cache,
            router,
            last_scores: Mutex::new(LruCache::new(CLOCK_AUTHORS)),
        }
    }

    pub async fn ingest(
        &self,
        author: UserId,
        new: NewTweet,
        deadline: Deadline,
    ) -> Result<Tweet, Error> {
        new.validate()?;
        let lock = format!("lock:ingest:{}:{}", author, new.fingerprint());
        deadline
            .run(async {
                match self.cache.set_nx(&lock, "1", LOCK_TTL).await {
                    Ok(true) => (),
                    Ok(false) => Err(Error::Conflict(
                        "an identical tweet is already being posted".into(),
                    ))?,
                    Err(e) => log::warn!("Posting without the ingest lock: {}", e),
                }
                let res = self.store_and_route(author, new).await;
                if let Err(e) = self.cache.del(&lock).await {
                    log::debug!("Could not release {}: {}", lock, e);
                }
                res
            })
            .await
    }

    async fn store_and_route(&self, author: UserId, new: NewTweet) -> Result<Tweet, Error> {
        let score = self.stamp(author);
        let tweet = new.into_tweet(TweetId::generate(score), author, score);
        PERSIST
            .retry(
                || self.store.put_tweet(&tweet),
                |e| matches!(e, Error::Persistence(_)),
            )
            .await?;
        log::info!("Stored tweet {} by {}", tweet.id, author);

        let follower_count = match FollowerCounts::new(&*self.cache, &*self.graph)
            .get(author)
            .await
        {
            Ok(count) => count,
            Err(e) => {
                log::warn!(
                    "Leaving tweet {} to the outbox sweeper; no follower count: {}",
                    tweet.id,
                    e
                );
                return Ok(tweet);
            }
        };

        self.router
            .route(&tweet.id, author, follower_count)
            .await
            .map_err(Error::Enqueue)?;

        if let Err(e) = self.store.outbox_ack(&tweet.id).await {
            // the sweeper re-drives it; duplicate jobs are harmless
            log::warn!("Could not clear outbox entry of {}: {}", tweet.id, e);
        }
        Ok(tweet)
    }

    /// The score for the author's next tweet: now, unless this node already stamped one of
    /// their tweets at or after now.
    fn stamp(&self, author: UserId) -> Score {
        let now = Score::now();
        let mut last_scores = self
            .last_scores
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let score = match last_scores.get(&author) {
            Some(last) if now <= *last => last.bump(),
            _ => now,
        };
        last_scores.put(author, score);
        score
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::broker::{MemoryBroker, Queue};
    use crate::cache::MemoryCache;
    use crate::job::JobKind;
    use crate::store::MemoryStore;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    struct Fixture {
        store: Arc<MemoryStore>,
        cache: Arc<MemoryCache>,
        broker: Arc<MemoryBroker>,
        ingestor: Ingestor,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let cache = Arc::new(MemoryCache::new());
        let broker = Arc::new(MemoryBroker::new());
        let ingestor = Ingestor::new(
            store.clone(),
            store.clone(),
            cache.clone(),
            Router::new(broker.clone(), 2),
        );
        Fixture {
            store,
            cache,
            broker,
            ingestor,
        }
    }

    fn post(content: &str) -> NewTweet {
        NewTweet {
            content: content.into(),
            ..NewTweet::default()
        }
    }

    fn deadline() -> Deadline {
        Deadline::after(Duration::from_secs(5))
    }

    #[tokio::test]
    async fn stores_and_enqueues() -> TestResult {
        let f = fixture();
        f.store.follow(UserId(2), UserId(1));
        let tweet = f.ingestor.ingest(UserId(1), post("hello"), deadline()).await?;

        assert_eq!(f.store.get_tweet(&tweet.id).await?, Some(tweet.clone()));
        assert_eq!(f.store.outbox_len(), 0);
        let jobs = f.broker.peek(Queue::Normal);
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].tweet_id, tweet.id);
        assert_eq!(jobs[0].kind, JobKind::Fanout { follower_count: 1 });
        Ok(())
    }

    #[tokio::test]
    async fn viral_authors_go_to_the_high_queue() -> TestResult {
        let f = fixture();
        for follower in 2..=4 {
            f.store.follow(UserId(follower), UserId(1));
        }
        f.ingestor.ingest(UserId(1), post("hi all"), deadline()).await?;
        assert_eq!(f.broker.len(Queue::High), 1);
        Ok(())
    }

    #[tokio::test]
    async fn invalid_tweets_are_not_stored() {
        let f = fixture();
        let res = f.ingestor.ingest(UserId(1), post("  "), deadline()).await;
        assert!(matches!(res, Err(Error::InvalidInput(_))));
        assert_eq!(f.store.outbox_len(), 0);
        assert!(f.broker.is_empty());
    }

    #[tokio::test]
    async fn scores_increase_per_author() -> TestResult {
        let f = fixture();
        let mut last = Score(i64::MIN);
        for n in 0..20 {
            let tweet = f
                .ingestor
                .ingest(UserId(1), post(&format!("tweet {}", n)), deadline())
                .await?;
            assert!(tweet.score() > last);
            last = tweet.score();
        }
        Ok(())
    }

    #[tokio::test]
    async fn identical_submission_in_flight_conflicts() -> TestResult {
        let f = fixture();
        let new = post("same words");
        let lock = format!("lock:ingest:{}:{}", UserId(1), new.fingerprint());
        f.cache.set(&lock, "1", None).await?;
        let res = f.ingestor.ingest(UserId(1), new.clone(), deadline()).await;
        assert!(matches!(res, Err(Error::Conflict(_))));

        f.cache.del(&lock).await?;
        f.ingestor.ingest(UserId(1), new, deadline()).await?;
        Ok(())
    }

    #[tokio::test]
    async fn duplicate_client_id_conflicts() -> TestResult {
        let f = fixture();
        let new = NewTweet {
            client_id: Some("c-1".into()),
            ..post("first")
        };
        f.ingestor.ingest(UserId(1), new, deadline()).await?;
        let again = NewTweet {
            client_id: Some("c-1".into()),
            ..post("second")
        };
        let res = f.ingestor.ingest(UserId(1), again, deadline()).await;
        assert!(matches!(res, Err(Error::Conflict(_))));
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn transient_persistence_failures_are_retried() -> TestResult {
        let f = fixture();
        f.store.fail_next_puts(2);
        f.ingestor.ingest(UserId(1), post("eventually"), deadline()).await?;

        f.store.fail_next_puts(3);
        let res = f.ingestor.ingest(UserId(1), post("never"), deadline()).await;
        assert!(matches!(res, Err(Error::Persistence(_))));
        Ok(())
    }

    #[tokio::test]
    async fn retry_after_a_lost_commit_acknowledgement_succeeds() -> TestResult {
        let f = fixture();
        f.store.lose_next_put_acks(1);
        let new = NewTweet {
            client_id: Some("c-1".into()),
            ..post("committed once")
        };
        let tweet = f.ingestor.ingest(UserId(1), new, deadline()).await?;
        assert_eq!(tweet.client_id.as_deref(), Some("c-1"));
        assert_eq!(f.store.tweet_count(), 1);
        assert_eq!(f.broker.len(Queue::Normal), 1);
        Ok(())
    }

    #[tokio::test]
    async fn broker_outage_leaves_the_outbox_entry() -> TestResult {
        let f = fixture();
        f.broker.set_unavailable(true);
        let res = f.ingestor.ingest(UserId(1), post("queued later"), deadline()).await;
        assert!(matches!(res, Err(Error::Enqueue(_))));
        assert_eq!(f.store.outbox_len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn cache_outage_does_not_block_ingest() -> TestResult {
        let f = fixture();
        f.cache.set_unavailable(true);
        f.ingestor.ingest(UserId(1), post("still works"), deadline()).await?;
        assert_eq!(f.broker.len(Queue::Normal), 1);
        Ok(())
    }
}
