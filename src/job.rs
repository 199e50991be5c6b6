//! Jobs as they travel through the broker.
//!
//! On the wire a job is a JSON object:
//!
//! ```text
//! {"id":"0d7c…","type":"fanout","payload":{"follower_count":42},"tweet_id":"17c1…",
//!  "author_id":"7","priority":"normal","created_at":"2024-04-05T10:00:00Z","attempt":0}
//! ```
//!
//! `type` and `payload` together name what the job asks for; only `fanout` jobs are handled
//! by this service, the other kinds belong to downstream consumers.
use crate::tweet::{TweetId, UserId};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Normal,
    High,
}

impl Priority {
    /// The numeric priority a broker with per-message priorities would be given.
    pub fn level(self) -> u8 {
        match self {
            Priority::Low => 1,
            Priority::Normal => 5,
            Priority::High => 10,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum JobKind {
    Fanout { follower_count: u64 },
    Index { content: String },
    Notify { recipient_ids: Vec<UserId> },
    Media { media_ids: Vec<String> },
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Job {
    pub id: Uuid,
    #[serde(flatten)]
    pub kind: JobKind,
    pub tweet_id: TweetId,
    pub author_id: UserId,
    pub priority: Priority,
    pub created_at: DateTime<Utc>,
    /// How many times this tweet has been re-driven; 0 for the first publish.
    #[serde(default)]
    pub attempt: u32,
}

impl Job {
    pub fn fanout(
        tweet_id: TweetId,
        author_id: UserId,
        follower_count: u64,
        priority: Priority,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: JobKind::Fanout { follower_count },
            tweet_id,
            author_id,
            priority,
            created_at: Utc::now(),
            attempt: 0,
        }
    }

    pub fn from_body(body: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(body)
    }

    pub fn to_body(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Whether the job sat in a queue longer than `ttl` and should be dropped.
    pub fn is_expired(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        chrono::Duration::from_std(ttl)
            .map(|ttl| now - self.created_at > ttl)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::{json, Value};

    #[test]
    fn fanout_job_wire_shape() -> Result<(), serde_json::Error> {
        let job = Job::fanout("t1".into(), UserId(7), 42, Priority::Normal);
        let value: Value = serde_json::from_slice(&job.to_body()?)?;
        assert_eq!(value["type"], "fanout");
        assert_eq!(value["payload"], json!({ "follower_count": 42 }));
        assert_eq!(value["tweet_id"], "t1");
        assert_eq!(value["author_id"], "7");
        assert_eq!(value["priority"], "normal");
        assert_eq!(value["attempt"], 0);
        Ok(())
    }

    #[test]
    fn other_job_kinds_parse() -> Result<(), serde_json::Error> {
        let body = json!({
            "id": "67e55044-10b1-426f-9247-bb680e5fe0c8",
            "type": "notify",
            "payload": { "recipient_ids": ["3", 4] },
            "tweet_id": "t9",
            "author_id": 1,
            "priority": "low",
            "created_at": "2024-04-05T10:00:00Z"
        });
        let job = Job::from_body(body.to_string().as_bytes())?;
        assert_eq!(
            job.kind,
            JobKind::Notify {
                recipient_ids: vec![UserId(3), UserId(4)]
            }
        );
        assert_eq!(job.attempt, 0);
        Ok(())
    }

    #[test]
    fn unknown_kinds_are_rejected() {
        assert!(Job::from_body(br#"{"type":"launch","payload":{}}"#).is_err());
        assert!(Job::from_body(b"not json").is_err());
    }

    #[test]
    fn jobs_expire_after_ttl() {
        let job = Job::fanout("t1".into(), UserId(7), 1, Priority::High);
        let later = job.created_at + chrono::Duration::minutes(61);
        assert!(job.is_expired(Duration::from_secs(3600), later));
        assert!(!job.is_expired(Duration::from_secs(3600), job.created_at));
    }

    #[test]
    fn priority_levels() {
        assert_eq!(Priority::High.level(), 10);
        assert_eq!(Priority::Normal.level(), 5);
        assert_eq!(Priority::Low.level(), 1);
    }
}
