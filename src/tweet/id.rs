use chrono::{DateTime, Utc};
use serde::{
    de::{self, Visitor},
    Deserialize, Deserializer, Serialize, Serializer,
};
use std::fmt;
use uuid::Uuid;

/// A user ID.
///
/// Internally, user IDs are i64s, but are sent to clients as strings because JavaScript
/// numbers don't support i64s.  This newtype serializes to/from a string, but keeps the
/// i64 as the "true" value for internal use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UserId(pub i64);

impl std::ops::Deref for UserId {
    type Target = i64;
    fn deref(&self) -> &i64 {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for UserId {
    type Err = std::num::ParseIntError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

impl Serialize for UserId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("{}", self.0))
    }
}

impl<'de> Deserialize<'de> for UserId {
    fn deserialize<D>(deserializer: D) -> Result<UserId, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(UserIdVisitor)
    }
}

struct UserIdVisitor;
impl<'de> Visitor<'de> for UserIdVisitor {
    type Value = UserId;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a string that can be parsed into an i64")
    }

    fn visit_str<E: de::Error>(self, value: &str) -> Result<Self::Value, E> {
        value
            .parse()
            .map_err(|e| E::custom(format!("could not parse: {}", e)))
    }

    fn visit_i64<E: de::Error>(self, value: i64) -> Result<Self::Value, E> {
        Ok(UserId(value))
    }

    fn visit_u64<E: de::Error>(self, value: u64) -> Result<Self::Value, E> {
        i64::try_from(value)
            .map(UserId)
            .map_err(|_| E::custom("user id out of range"))
    }
}

/// Position of a tweet in every timeline: its creation time in nanoseconds since the epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Score(pub i64);

impl Score {
    pub fn now() -> Self {
        Self::from_datetime(Utc::now())
    }

    pub fn from_datetime(time: DateTime<Utc>) -> Self {
        // `None` only past the year 2262
        Self(time.timestamp_nanos_opt().unwrap_or(i64::MAX))
    }

    pub fn to_datetime(self) -> DateTime<Utc> {
        DateTime::from_timestamp_nanos(self.0)
    }

    /// The score as the cache keeps it: the nearest double.  Nanosecond timestamps lose
    /// their last few digits.
    pub fn rounded(self) -> Self {
        Self(self.0 as f64 as i64)
    }

    /// The smallest score strictly after `self`.
    pub fn bump(self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An opaque tweet ID.
///
/// Generated IDs start with the fixed-width hex form of the tweet's score, so sorting IDs
/// as strings sorts them by creation time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TweetId(pub String);

impl TweetId {
    pub const MAX_LEN: usize = 64;

    pub fn generate(score: Score) -> Self {
        let suffix = (Uuid::new_v4().as_u128() & 0xffff_ffff) as u32;
        Self(format!("{:016x}{:08x}", score.0.max(0), suffix))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The score a generated id was created with.
    pub fn embedded_score(&self) -> Option<Score> {
        if self.0.len() != 24 || !self.0.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        i64::from_str_radix(&self.0[..16], 16).ok().map(Score)
    }
}

impl std::ops::Deref for TweetId {
    type Target = str;
    fn deref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TweetId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TweetId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn generated_ids_sort_like_their_scores() {
        let early = TweetId::generate(Score(1_700_000_000_000_000_000));
        let late = TweetId::generate(Score(1_700_000_000_000_000_001));
        assert!(early < late);
        assert_eq!(early.len(), 24);
    }

    #[test]
    fn generated_ids_carry_their_exact_score() {
        let score = Score(1_712_345_678_123_456_789);
        assert_eq!(TweetId::generate(score).embedded_score(), Some(score));
        assert_ne!(score.rounded(), score);
        assert_eq!(TweetId::from("t1").embedded_score(), None);
        assert_eq!(TweetId::from("zz00000000000000deadbeef").embedded_score(), None);
    }

    #[test]
    fn small_scores_survive_rounding() {
        assert_eq!(Score(100).rounded(), Score(100));
        assert_eq!(Score(i64::MAX).rounded(), Score(i64::MAX));
    }

    #[test]
    fn user_id_round_trips_as_string() -> Result<(), serde_json::Error> {
        let json = serde_json::to_string(&UserId(42))?;
        assert_eq!(json, "\"42\"");
        assert_eq!(serde_json::from_str::<UserId>("\"42\"")?, UserId(42));
        assert_eq!(serde_json::from_str::<UserId>("42")?, UserId(42));
        Ok(())
    }

    #[test]
    fn score_survives_datetime_conversion() {
        let score = Score(1_712_345_678_123_456_789);
        assert_eq!(Score::from_datetime(score.to_datetime()), score);
    }
}
