//! Tweets as the core sees them: an immutable body plus counters owned by collaborators.
mod id;

pub use id::{Score, TweetId, UserId};

use crate::error::Error;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub const MAX_CONTENT_CHARS: usize = 280;
pub const MAX_CLIENT_ID_CHARS: usize = 64;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq)]
pub struct Counters {
    pub likes: i64,
    pub retweets: i64,
    pub replies: i64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Tweet {
    pub id: TweetId,
    pub author_id: UserId,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub reply_to_id: Option<TweetId>,
    pub retweet_of_id: Option<TweetId>,
    pub counters: Counters,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub client_id: Option<String>,
}

impl Tweet {
    pub fn score(&self) -> Score {
        Score::from_datetime(self.created_at)
    }

    pub fn is_retweet(&self) -> bool {
        self.retweet_of_id.is_some()
    }
}

/// A tweet as submitted by its author, before it has an id or a timestamp.
#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
pub struct NewTweet {
    #[serde(default)]
    pub content: String,
    pub reply_to_id: Option<TweetId>,
    pub retweet_of_id: Option<TweetId>,
    /// Idempotency key chosen by the client; unique per author.
    pub client_id: Option<String>,
}

impl NewTweet {
    pub fn validate(&self) -> Result<(), Error> {
        use Error::InvalidInput;
        for id in self.reply_to_id.iter().chain(self.retweet_of_id.iter()) {
            if id.is_empty() || id.len() > TweetId::MAX_LEN {
                Err(InvalidInput(format!("`{}` is not a valid tweet id", id)))?
            }
        }

        match (&self.retweet_of_id, &self.reply_to_id) {
            (Some(_), Some(_)) => Err(InvalidInput(
                "a tweet cannot be both a reply and a retweet".into(),
            ))?,
            (Some(_), None) if !self.content.is_empty() => Err(InvalidInput(
                "a retweet must not carry content".into(),
            ))?,
            (Some(_), None) => (),
            (None, _) if self.content.trim().is_empty() => {
                Err(InvalidInput("content must not be empty".into()))?
            }
            (None, _) => (),
        }

        let len = self.content.chars().count();
        if len > MAX_CONTENT_CHARS {
            Err(InvalidInput(format!(
                "content is {} characters long; the limit is {}",
                len, MAX_CONTENT_CHARS
            )))?
        }
        if self
            .content
            .chars()
            .any(|c| c.is_control() && c != '\n' && c != '\t')
        {
            Err(InvalidInput("content contains control characters".into()))?
        }

        if let Some(client_id) = &self.client_id {
            let len = client_id.chars().count();
            if len == 0 || len > MAX_CLIENT_ID_CHARS {
                Err(InvalidInput(format!(
                    "client_id must be between 1 and {} characters",
                    MAX_CLIENT_ID_CHARS
                )))?
            }
        }
        Ok(())
    }

    /// Hex SHA-256 of everything that makes two submissions the same tweet.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.content.as_bytes());
        hasher.update([0]);
        hasher.update(self.reply_to_id.as_deref().unwrap_or("").as_bytes());
        hasher.update([0]);
        hasher.update(self.retweet_of_id.as_deref().unwrap_or("").as_bytes());
        hasher
            .finalize()
            .iter()
            .map(|byte| format!("{:02x}", byte))
            .collect()
    }

    pub fn into_tweet(self, id: TweetId, author_id: UserId, score: Score) -> Tweet {
        Tweet {
            id,
            author_id,
            content: self.content,
            created_at: score.to_datetime(),
            reply_to_id: self.reply_to_id,
            retweet_of_id: self.retweet_of_id,
            counters: Counters::default(),
            client_id: self.client_id,
        }
    }
}
