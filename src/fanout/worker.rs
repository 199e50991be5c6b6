//! A consumer of the fan-out queues.
use super::Fanout;
use crate::broker::{Broker, Delivery, Queue, QUEUE_TTL};
use crate::config;
use crate::deadline::Deadline;
use crate::job::JobKind;

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Semaphore};

/// What became of a delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Acked,
    /// Handed back to its queue for another try.
    Requeued,
    /// Removed from the queue without being processed.
    Dropped,
}

pub struct Worker {
    broker: Arc<dyn Broker>,
    fanout: Arc<Fanout>,
    prefetch: usize,
    poll_interval: Duration,
    job_deadline: Duration,
}

impl Worker {
    pub fn new(
        broker: Arc<dyn Broker>,
        fanout: Arc<Fanout>,
        cfg: &config::Fanout,
        poll_interval: Duration,
    ) -> Self {
        Self {
            broker,
            fanout,
            prefetch: (*cfg.prefetch).max(1),
            poll_interval,
            job_deadline: *cfg.job_deadline,
        }
    }

    /// Consumes until `shutdown` flips to `true`, with up to `prefetch` jobs in flight.
    /// Jobs already started are finished before this returns.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let in_flight = Arc::new(Semaphore::new(self.prefetch));
        let mut tick: u64 = 0;
        loop {
            if *shutdown.borrow() {
                break;
            }
            let permit = tokio::select! {
                permit = in_flight.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
                changed = shutdown.changed() => match changed {
                    Ok(()) => continue,
                    Err(_) => break,
                },
            };

            match self.broker.consume(&Queue::poll_order(tick)).await {
                Ok(Some(delivery)) => {
                    let worker = self.clone();
                    tokio::spawn(async move {
                        worker.handle(delivery).await;
                        drop(permit);
                    });
                }
                Ok(None) => {
                    drop(permit);
                    if !self.idle(&mut shutdown).await {
                        break;
                    }
                }
                Err(e) => {
                    drop(permit);
                    log::error!("Could not consume from the fan-out queues: {}", e);
                    if !self.idle(&mut shutdown).await {
                        break;
                    }
                }
            }
            tick = tick.wrapping_add(1);
        }

        log::info!("Fan-out worker draining in-flight jobs");
        let all = u32::try_from(self.prefetch).unwrap_or(u32::MAX);
        if in_flight.acquire_many(all).await.is_err() {
            log::warn!("Fan-out worker stopped without draining");
        }
    }

    /// Waits one polling interval; `false` once nobody can signal shutdown anymore.
    async fn idle(&self, shutdown: &mut watch::Receiver<bool>) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(self.poll_interval) => true,
            changed = shutdown.changed() => changed.is_ok(),
        }
    }

    /// Processes one delivery and acks or nacks it.
    pub async fn handle(&self, delivery: Delivery) -> Disposition {
        let job = match delivery.job() {
            Ok(job) => job,
            Err(e) => {
                log::error!("Dropping unreadable message from {}: {}", delivery.queue, e);
                return self.settle(&delivery, Disposition::Dropped).await;
            }
        };
        let follower_count = match job.kind {
            JobKind::Fanout { follower_count } => follower_count,
            ref other => {
                log::warn!("Dropping job {} of a kind fan-out does not handle: {:?}", job.id, other);
                return self.settle(&delivery, Disposition::Dropped).await;
            }
        };
        if job.is_expired(QUEUE_TTL, Utc::now()) {
            log::warn!("Dropping job {} for {}: queued since {}", job.id, job.tweet_id, job.created_at);
            return self.settle(&delivery, Disposition::Acked).await;
        }

        let deadline = Deadline::after(self.job_deadline);
        let disposition = match self
            .fanout
            .fan_out(&job.tweet_id, follower_count, deadline)
            .await
        {
            Ok(outcome) => {
                log::debug!("Job {} for {} done: {:?}", job.id, job.tweet_id, outcome);
                Disposition::Acked
            }
            Err(e) if e.is_transient() && delivery.redelivered => {
                log::warn!("Requeueing job {} for {} again: {}", job.id, job.tweet_id, e);
                Disposition::Requeued
            }
            Err(e) if e.is_transient() => {
                log::info!("Requeueing job {} for {}: {}", job.id, job.tweet_id, e);
                Disposition::Requeued
            }
            Err(e) => {
                log::error!("Dropping job {} for {}: {}", job.id, job.tweet_id, e);
                Disposition::Dropped
            }
        };
        self.settle(&delivery, disposition).await
    }

    async fn settle(&self, delivery: &Delivery, disposition: Disposition) -> Disposition {
        let res = match disposition {
            Disposition::Acked => self.broker.ack(delivery).await,
            Disposition::Requeued => self.broker.nack(delivery, true).await,
            Disposition::Dropped => self.broker.nack(delivery, false).await,
        };
        if let Err(e) = res {
            // the broker hands unsettled messages out again
            log::error!("Could not settle delivery {}: {}", delivery.tag, e);
        }
        disposition
    }
}
