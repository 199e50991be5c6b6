//! Broker over Redis lists.
//!
//! Each queue is a list; producers `LPUSH` and consumers `RPOPLPUSH` into a processing list
//! of their own (`{queue}.processing.{consumer}`), so a message a crashed consumer was
//! holding is still in Redis.  Acking removes it from the processing list; a requeuing nack
//! pushes it back onto the consuming end of its queue.
//!
//! Every consumer id is unique to one process and registered in `fanout.consumers`, with a
//! lease the consumer renews while it polls.  Whoever starts next returns the processing
//! lists of consumers whose lease ran out to their queues.
use super::{Broker, Delivery, Queue, Result};
use crate::cache::{RedisCmd, RedisPool, Reply};
use crate::job::Job;

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};
use uuid::Uuid;

/// How long a consumer counts as alive after it last polled.
pub const LEASE: Duration = Duration::from_secs(5 * 60);
const CONSUMERS: &str = "fanout.consumers";

#[derive(Debug)]
pub struct RedisBroker {
    pool: RedisPool,
    consumer: String,
    next_tag: AtomicU64,
    renewed_at: Mutex<Option<Instant>>,
}

impl RedisBroker {
    pub fn new(pool: RedisPool, consumer: impl Into<String>) -> Self {
        Self {
            pool,
            consumer: consumer.into(),
            next_tag: AtomicU64::new(0),
            renewed_at: Mutex::new(None),
        }
    }

    /// A consumer id no other process uses: the host name plus a random suffix.
    pub fn consumer_id(host: Option<&str>) -> String {
        format!("{}-{}", host.unwrap_or("chirp"), Uuid::new_v4().simple())
    }

    fn queue_key(&self, queue: Queue) -> String {
        self.pool.key(queue.name())
    }

    fn processing_key(&self, queue: Queue, consumer: &str) -> String {
        self.pool
            .key(&format!("{}.processing.{}", queue.name(), consumer))
    }

    fn lease_key(&self, consumer: &str) -> String {
        self.pool.key(&format!("fanout.consumer.{}", consumer))
    }

    /// Returns every message that consumers without a live lease left unacked to its
    /// queue, and registers this consumer.
    ///
    /// Must run before this consumer starts consuming.
    pub async fn recover(&self) -> Result<usize> {
        let consumers = self
            .pool
            .send(RedisCmd::new("SMEMBERS").arg(self.pool.key(CONSUMERS)))
            .await?
            .array()?;
        let mut recovered = 0;
        for consumer in consumers {
            let consumer = match consumer.bulk_string()? {
                Some(consumer) if consumer != self.consumer => consumer,
                _ => continue,
            };
            let alive = RedisCmd::new("EXISTS").arg(self.lease_key(&consumer));
            if self.pool.send(alive).await?.integer()? > 0 {
                continue;
            }
            let returned = self.requeue_processing(&consumer).await?;
            if returned > 0 {
                log::warn!(
                    "Returned {} unacked message(s) from consumer `{}` to their queues",
                    returned,
                    consumer
                );
            }
            recovered += returned;
            let gone = RedisCmd::new("SREM")
                .arg(self.pool.key(CONSUMERS))
                .arg(&consumer);
            self.pool.send(gone).await?;
        }

        let register = RedisCmd::new("SADD")
            .arg(self.pool.key(CONSUMERS))
            .arg(&self.consumer);
        self.pool.send(register).await?;
        self.renew_lease().await?;
        Ok(recovered)
    }

    async fn requeue_processing(&self, consumer: &str) -> Result<usize> {
        let mut returned = 0;
        for queue in Queue::ALL {
            loop {
                let cmd = RedisCmd::new("RPOPLPUSH")
                    .arg(self.processing_key(queue, consumer))
                    .arg(self.queue_key(queue));
                match self.pool.send(cmd).await? {
                    Reply::Nil => break,
                    _ => returned += 1,
                }
            }
        }
        Ok(returned)
    }

    async fn renew_lease(&self) -> Result<()> {
        let cmd = RedisCmd::new("SET")
            .arg(self.lease_key(&self.consumer))
            .arg("1")
            .arg("EX")
            .arg(LEASE.as_secs().to_string());
        self.pool.send(cmd).await?;
        *self.renewed_at.lock().unwrap_or_else(PoisonError::into_inner) = Some(Instant::now());
        Ok(())
    }

    /// Renews the lease once a quarter of it has passed.
    async fn keep_alive(&self) -> Result<()> {
        let due = self
            .renewed_at
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .map_or(true, |at| at.elapsed() >= LEASE / 4);
        if due {
            self.renew_lease().await?;
        }
        Ok(())
    }

    async fn remove_from_processing(&self, delivery: &Delivery) -> Result<i64> {
        let cmd = RedisCmd::new("LREM")
            .arg(self.processing_key(delivery.queue, &self.consumer))
            .arg("1")
            .arg(&delivery.body);
        Ok(self.pool.send(cmd).await?.integer()?)
    }
}

#[async_trait]
impl Broker for RedisBroker {
    async fn publish(&self, queue: Queue, job: &Job) -> Result<()> {
        let cmd = RedisCmd::new("LPUSH")
            .arg(self.queue_key(queue))
            .arg(job.to_body()?);
        self.pool.send(cmd).await?;
        Ok(())
    }

    async fn consume(&self, queues: &[Queue]) -> Result<Option<Delivery>> {
        self.keep_alive().await?;
        for queue in queues {
            let cmd = RedisCmd::new("RPOPLPUSH")
                .arg(self.queue_key(*queue))
                .arg(self.processing_key(*queue, &self.consumer));
            match self.pool.send(cmd).await? {
                Reply::Bulk(body) => {
                    return Ok(Some(Delivery {
                        queue: *queue,
                        body,
                        redelivered: false,
                        tag: self.next_tag.fetch_add(1, Ordering::Relaxed),
                    }))
                }
                Reply::Nil => continue,
                other => Err(crate::cache::RedisConnErr::InvalidRedisReply(format!(
                    "{:?}",
                    other
                )))?,
            }
        }
        Ok(None)
    }

    async fn ack(&self, delivery: &Delivery) -> Result<()> {
        if self.remove_from_processing(delivery).await? == 0 {
            log::warn!(
                "Acked delivery {} from {} was no longer in flight",
                delivery.tag,
                delivery.queue
            );
        }
        Ok(())
    }

    async fn nack(&self, delivery: &Delivery, requeue: bool) -> Result<()> {
        let removed = self.remove_from_processing(delivery).await?;
        if requeue && removed > 0 {
            let cmd = RedisCmd::new("RPUSH")
                .arg(self.queue_key(delivery.queue))
                .arg(&delivery.body);
            self.pool.send(cmd).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn consumer_ids_are_unique_per_process() {
        let first = RedisBroker::consumer_id(Some("fanout-7d9f"));
        let second = RedisBroker::consumer_id(Some("fanout-7d9f"));
        assert_ne!(first, second);
        assert!(first.starts_with("fanout-7d9f-"));
        assert!(RedisBroker::consumer_id(None).starts_with("chirp-"));
    }
}
