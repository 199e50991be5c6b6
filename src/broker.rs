//! Durable work queues between the router and the fan-out workers.
//!
//! A `Broker` offers at-least-once delivery: a consumed message stays owned by its consumer
//! until it is acked, and goes back to its queue when it is nacked with `requeue`.
mod err;
mod memory;
mod redis;

pub use err::BrokerErr;
pub use memory::MemoryBroker;
pub use redis::RedisBroker;

use crate::job::{Job, Priority};

use async_trait::async_trait;
use std::fmt;
use std::time::Duration;

pub type Result<T> = std::result::Result<T, BrokerErr>;

/// Messages older than this are dropped by consumers instead of processed.
pub const QUEUE_TTL: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Queue {
    High,
    Normal,
    Low,
}

impl Queue {
    pub const ALL: [Queue; 3] = [Queue::High, Queue::Normal, Queue::Low];

    pub fn name(self) -> &'static str {
        match self {
            Queue::High => "fanout.high",
            Queue::Normal => "fanout.normal",
            Queue::Low => "fanout.low",
        }
    }

    pub fn for_priority(priority: Priority) -> Self {
        match priority {
            Priority::High => Queue::High,
            Priority::Normal => Queue::Normal,
            Priority::Low => Queue::Low,
        }
    }

    /// The order in which a consumer should try the queues on its `tick`th poll.
    ///
    /// Over every six polls the high queue goes first three times, the normal queue twice,
    /// and the low queue once, so a busy high queue cannot starve the others.
    pub fn poll_order(tick: u64) -> [Queue; 3] {
        use Queue::*;
        match tick % 6 {
            0 | 2 | 4 => [High, Normal, Low],
            1 | 3 => [Normal, High, Low],
            _ => [Low, High, Normal],
        }
    }
}

impl fmt::Display for Queue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A message handed to a consumer and not yet acked.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub queue: Queue,
    pub body: Vec<u8>,
    /// Set when the broker knows this message was delivered before.
    pub redelivered: bool,
    pub tag: u64,
}

impl Delivery {
    pub fn job(&self) -> std::result::Result<Job, BrokerErr> {
        Job::from_body(&self.body).map_err(|e| BrokerErr::Unparseable(e.to_string()))
    }
}

#[async_trait]
pub trait Broker: Send + Sync {
    async fn publish(&self, queue: Queue, job: &Job) -> Result<()>;
    /// Takes the next message from the first non-empty queue in `queues`, without waiting.
    async fn consume(&self, queues: &[Queue]) -> Result<Option<Delivery>>;
    async fn ack(&self, delivery: &Delivery) -> Result<()>;
    async fn nack(&self, delivery: &Delivery, requeue: bool) -> Result<()>;
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn poll_order_weights_queues() {
        let firsts: Vec<Queue> = (0..6).map(|tick| Queue::poll_order(tick)[0]).collect();
        let count = |q| firsts.iter().filter(|first| **first == q).count();
        assert_eq!(count(Queue::High), 3);
        assert_eq!(count(Queue::Normal), 2);
        assert_eq!(count(Queue::Low), 1);
        for tick in 0..6 {
            let mut order = Queue::poll_order(tick).to_vec();
            order.sort();
            assert_eq!(order, Queue::ALL.to_vec());
        }
    }

    #[test]
    fn queue_names() {
        assert_eq!(Queue::for_priority(Priority::High).name(), "fanout.high");
        assert_eq!(Queue::Normal.to_string(), "fanout.normal");
        assert_eq!(Queue::Low.name(), "fanout.low");
    }
}
