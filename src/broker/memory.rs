//! In-process broker for tests and single-node development.
//!
//! Nothing survives a restart and nothing is shared between processes.
use super::{Broker, BrokerErr, Delivery, Queue, Result};
use crate::job::Job;

use async_trait::async_trait;
use hashbrown::HashMap;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct State {
    queues: HashMap<Queue, VecDeque<(Vec<u8>, bool)>>,
    unacked: HashMap<u64, Delivery>,
    next_tag: u64,
    unavailable: bool,
}

#[derive(Debug, Default)]
pub struct MemoryBroker {
    state: Mutex<State>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every call fail until called again with `false`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.lock().unavailable = unavailable;
    }

    pub fn len(&self, queue: Queue) -> usize {
        self.lock().queues.get(&queue).map_or(0, VecDeque::len)
    }

    pub fn is_empty(&self) -> bool {
        Queue::ALL.iter().all(|q| self.len(*q) == 0)
    }

    pub fn unacked(&self) -> usize {
        self.lock().unacked.len()
    }

    /// Every job waiting in `queue`, oldest first.
    pub fn peek(&self, queue: Queue) -> Vec<Job> {
        self.lock()
            .queues
            .get(&queue)
            .map(|q| q.iter().filter_map(|(body, _)| Job::from_body(body).ok()).collect())
            .unwrap_or_default()
    }

    /// Pushes a raw message, bypassing serialization.
    pub fn push_raw(&self, queue: Queue, body: Vec<u8>) {
        self.lock().queues.entry(queue).or_default().push_back((body, false));
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check(state: &State) -> Result<()> {
        if state.unavailable {
            Err(BrokerErr::Unavailable("connection refused".into()))?
        }
        Ok(())
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn publish(&self, queue: Queue, job: &Job) -> Result<()> {
        let body = job.to_body()?;
        let mut state = self.lock();
        Self::check(&state)?;
        state.queues.entry(queue).or_default().push_back((body, false));
        Ok(())
    }

    async fn consume(&self, queues: &[Queue]) -> Result<Option<Delivery>> {
        let mut state = self.lock();
        Self::check(&state)?;
        for queue in queues {
            if let Some((body, redelivered)) = state.queues.get_mut(queue).and_then(VecDeque::pop_front) {
                state.next_tag += 1;
                let delivery = Delivery {
                    queue: *queue,
                    body,
                    redelivered,
                    tag: state.next_tag,
                };
                state.unacked.insert(delivery.tag, delivery.clone());
                return Ok(Some(delivery));
            }
        }
        Ok(None)
    }

    async fn ack(&self, delivery: &Delivery) -> Result<()> {
        let mut state = self.lock();
        Self::check(&state)?;
        state
            .unacked
            .remove(&delivery.tag)
            .map(|_| ())
            .ok_or(BrokerErr::UnknownDelivery(delivery.tag))
    }

    async fn nack(&self, delivery: &Delivery, requeue: bool) -> Result<()> {
        let mut state = self.lock();
        Self::check(&state)?;
        let delivery = state
            .unacked
            .remove(&delivery.tag)
            .ok_or(BrokerErr::UnknownDelivery(delivery.tag))?;
        if requeue {
            state
                .queues
                .entry(delivery.queue)
                .or_default()
                .push_back((delivery.body, true));
        }
        Ok(())
    }
}
