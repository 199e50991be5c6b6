use super::Entry;
use crate::error::Error;
use crate::tweet::{Score, TweetId};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// An opaque position in a timeline: the entry a page ended on.
///
/// Clients see URL-safe base64 (without padding) of `"{score}:{tweet_id}"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cursor(pub Entry);

impl Cursor {
    pub fn entry(&self) -> &Entry {
        &self.0
    }
}

impl From<Entry> for Cursor {
    fn from(entry: Entry) -> Self {
        Self(entry)
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let raw = format!("{}:{}", self.0.score, self.0.tweet_id);
        write!(f, "{}", URL_SAFE_NO_PAD.encode(raw))
    }
}

impl Serialize for Cursor {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl FromStr for Cursor {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || Error::InvalidInput(format!("`{}` is not a valid cursor", s));
        let raw = URL_SAFE_NO_PAD.decode(s).map_err(|_| invalid())?;
        let raw = String::from_utf8(raw).map_err(|_| invalid())?;
        let (score, tweet_id) = raw.split_once(':').ok_or_else(invalid)?;
        let score = score.parse().map_err(|_| invalid())?;
        if tweet_id.is_empty() || tweet_id.len() > TweetId::MAX_LEN {
            Err(invalid())?
        }
        Ok(Self(Entry::new(tweet_id.into(), Score(score))))
    }
}
