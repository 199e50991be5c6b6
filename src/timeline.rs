//! Materialized timelines: which ones exist, what they hold, and how they are read.
mod cache;
mod cursor;
mod reader;

pub use cache::{PullOnlyIndex, TimelineCache};
pub use cursor::Cursor;
pub use reader::{Page, Reader};

use crate::tweet::{Score, TweetId, UserId};

use std::fmt;

/// Requests for more than this many tweets are cut down to it.
pub const MAX_PAGE: usize = 100;
pub const DEFAULT_PAGE: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Timeline {
    /// Everything the user follows, newest first.
    Home(UserId),
    /// Everything the user wrote.
    Author(UserId),
}

impl Timeline {
    pub fn key(&self) -> String {
        match self {
            Timeline::Home(id) => format!("timeline:home:{}", id),
            Timeline::Author(id) => format!("timeline:user:{}", id),
        }
    }
}

impl fmt::Display for Timeline {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// One element of a timeline.
///
/// Entries order by score, then by tweet id; timelines list them in descending order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Entry {
    pub score: Score,
    pub tweet_id: TweetId,
}

impl Entry {
    pub fn new(tweet_id: TweetId, score: Score) -> Self {
        Self { score, tweet_id }
    }
}

/// Merges several descending entry lists into one descending list without duplicates,
/// keeping the lowest score seen for a tweet.
pub fn merge_desc(lists: impl IntoIterator<Item = Vec<Entry>>) -> Vec<Entry> {
    use hashbrown::HashMap;
    let mut best: HashMap<TweetId, Score> = HashMap::new();
    for entry in lists.into_iter().flatten() {
        best.entry(entry.tweet_id)
            .and_modify(|score| *score = (*score).min(entry.score))
            .or_insert(entry.score);
    }
    let mut merged: Vec<Entry> = best
        .into_iter()
        .map(|(tweet_id, score)| Entry::new(tweet_id, score))
        .collect();
    merged.sort_unstable_by(|a, b| b.cmp(a));
    merged
}

/// Clamps a requested page size into `1..=MAX_PAGE`.
pub fn clamp_limit(limit: Option<usize>) -> usize {
    limit.unwrap_or(DEFAULT_PAGE).clamp(1, MAX_PAGE)
}
