use super::{Entry, Timeline};
use crate::cache::{self, Cache, ScoreBound, ZAdd};
use crate::tweet::{Score, TweetId, UserId};

use std::sync::Arc;
use std::time::Duration;

/// Member that marks a timeline as holding everything it should, up to its window.
const COMPLETE: &str = "+complete";
/// Scored above every real tweet, so it ranks first and score-bounded reads skip it.
const COMPLETE_SCORE: Score = Score(i64::MAX);
const NEWEST: ScoreBound = ScoreBound::Exclusive(COMPLETE_SCORE);

/// Timelines stored as sorted sets in the shared cache, scored by tweet creation time.
///
/// No timeline is ever observed with more than `window` entries: every insert trims the
/// set back down, and reads never look past rank `window`, so a reader racing an insert
/// cannot see the entry about to be evicted.
///
/// Inserting into a timeline whose key has expired or been evicted starts it over with
/// just the new entry.  Such a timeline is incomplete until whoever rebuilds it from
/// persistence calls `mark_complete`; the marker lives in the set itself, so it goes
/// whenever the rest of the set does.
///
/// The cache keeps scores as doubles, which cannot hold nanosecond timestamps exactly.
/// Entries read back take their exact score from the tweet id when the id carries one.
#[derive(Clone)]
pub struct TimelineCache {
    cache: Arc<dyn Cache>,
    window: usize,
    ttl: Duration,
}

impl TimelineCache {
    pub fn new(cache: Arc<dyn Cache>, window: usize, ttl: Duration) -> Self {
        Self { cache, window, ttl }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    /// Adds `tweet_id`; inserting an id that is already present can only lower its score.
    pub async fn insert(&self, tl: Timeline, tweet_id: &TweetId, score: Score) -> cache::Result<()> {
        self.insert_many(tl, &[Entry::new(tweet_id.clone(), score)])
            .await
    }

    pub async fn insert_many(&self, tl: Timeline, entries: &[Entry]) -> cache::Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let key = tl.key();
        let members: Vec<(Score, String)> = entries
            .iter()
            .map(|entry| (entry.score, entry.tweet_id.0.clone()))
            .collect();
        self.cache.zadd(&key, &members, ZAdd::KeepLower).await?;
        if self.cache.zcard(&key).await? > self.window {
            self.trim(tl, self.window).await?;
        }
        self.cache.expire(&key, self.ttl).await?;
        Ok(())
    }

    /// Records that `tl` now holds every entry it should.
    pub async fn mark_complete(&self, tl: Timeline) -> cache::Result<()> {
        let key = tl.key();
        self.cache
            .zadd(&key, &[(COMPLETE_SCORE, COMPLETE.to_string())], ZAdd::Upsert)
            .await?;
        self.cache.expire(&key, self.ttl).await?;
        Ok(())
    }

    /// Whether `tl` was rebuilt and has not expired since.  An incomplete timeline may be
    /// missing anything older than its newest entries.
    pub async fn is_complete(&self, tl: Timeline) -> cache::Result<bool> {
        let scores = self.cache.zscore(&tl.key(), &[COMPLETE.to_string()]).await?;
        Ok(scores.into_iter().flatten().next().is_some())
    }

    pub async fn remove(&self, tl: Timeline, tweet_id: &TweetId) -> cache::Result<bool> {
        Ok(self.cache.zrem(&tl.key(), &[tweet_id.0.clone()]).await? > 0)
    }

    /// Evicts the lowest-ranked entries until at most `window` remain.
    pub async fn trim(&self, tl: Timeline, window: usize) -> cache::Result<usize> {
        if window == 0 {
            let len = self.len(tl).await?;
            self.cache.del(&tl.key()).await?;
            return Ok(len);
        }
        let keep = window + usize::from(self.is_complete(tl).await?);
        let stop = -(keep as i64) - 1;
        self.cache.zremrangebyrank(&tl.key(), 0, stop).await
    }

    pub async fn len(&self, tl: Timeline) -> cache::Result<usize> {
        let members = self.cache.zcard(&tl.key()).await?;
        let marker = if members > 0 {
            usize::from(self.is_complete(tl).await?)
        } else {
            0
        };
        Ok((members - marker).min(self.window))
    }

    /// Up to `limit` entries starting at rank `offset`, newest first.
    pub async fn range(&self, tl: Timeline, offset: usize, limit: usize) -> cache::Result<Vec<Entry>> {
        let stop = offset.saturating_add(limit).min(self.window);
        if offset >= stop {
            return Ok(Vec::new());
        }
        let members = self
            .cache
            .zrevrange_by_score(&tl.key(), NEWEST, ScoreBound::Unbounded, offset, stop - offset)
            .await?;
        Ok(to_entries(members))
    }

    /// Up to `limit` entries ranked below `before` (newest first) and scored at least
    /// `floor`.
    pub async fn range_after(
        &self,
        tl: Timeline,
        before: Option<&Entry>,
        floor: Option<Score>,
        limit: usize,
    ) -> cache::Result<Vec<Entry>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let key = tl.key();
        let min = floor.map_or(ScoreBound::Unbounded, ScoreBound::Inclusive);

        // the cache compares rounded scores, so each query can return entries just past
        // its bounds; those are dropped by their exact scores
        let mut entries = match before {
            None => to_entries(
                self.cache
                    .zrevrange_by_score(&key, NEWEST, min, 0, limit)
                    .await?,
            ),
            Some(before) => {
                let ties = self
                    .cache
                    .zrevrange_by_score(
                        &key,
                        ScoreBound::Inclusive(before.score),
                        ScoreBound::Inclusive(before.score),
                        0,
                        self.window,
                    )
                    .await?;
                let mut entries: Vec<Entry> = to_entries(ties)
                    .into_iter()
                    .filter(|entry| entry < before)
                    .collect();
                entries.sort_unstable_by(|a, b| b.cmp(a));
                entries.truncate(limit);
                if entries.len() < limit {
                    let older = self
                        .cache
                        .zrevrange_by_score(
                            &key,
                            ScoreBound::Exclusive(before.score),
                            min,
                            0,
                            limit - entries.len(),
                        )
                        .await?;
                    entries.extend(to_entries(older));
                }
                entries
            }
        };
        if let Some(floor) = floor {
            entries.retain(|entry| entry.score >= floor);
        }
        entries.truncate(limit);

        if let Some(bottom) = self.window_bottom(&key).await? {
            entries.retain(|entry| *entry >= bottom);
        }
        Ok(entries)
    }

    /// The lowest entry still inside the window, when the set has reached it.
    async fn window_bottom(&self, key: &str) -> cache::Result<Option<Entry>> {
        let rank = self.window.saturating_sub(1);
        let members = self
            .cache
            .zrevrange_by_score(key, NEWEST, ScoreBound::Unbounded, rank, 1)
            .await?;
        Ok(to_entries(members).into_iter().next())
    }
}

/// Reads cached members back as entries.  A generated id carries its tweet's exact score,
/// which is kept whenever it agrees with the cached one.
fn to_entries(members: Vec<(String, Score)>) -> Vec<Entry> {
    members
        .into_iter()
        .filter(|(id, _)| id != COMPLETE)
        .map(|(id, cached)| {
            let id = TweetId(id);
            let score = id
                .embedded_score()
                .filter(|exact| exact.rounded() == cached.rounded())
                .unwrap_or(cached);
            Entry::new(id, score)
        })
        .collect()
}

/// Authors whose tweets are pulled at read time instead of pushed, each scored by the
/// newest tweet that was not pushed.
#[derive(Clone)]
pub struct PullOnlyIndex {
    cache: Arc<dyn Cache>,
}

impl PullOnlyIndex {
    pub const KEY: &'static str = "fanout:pull_only";

    pub fn new(cache: Arc<dyn Cache>) -> Self {
        Self { cache }
    }

    /// Records that the author's tweet at `score` was not pushed.  The marker only moves
    /// forward.
    pub async fn mark(&self, author: UserId, score: Score) -> cache::Result<()> {
        self.cache
            .zadd(Self::KEY, &[(score, author.to_string())], ZAdd::KeepHigher)
            .await?;
        Ok(())
    }

    /// For each author, the score of their newest pull-only tweet, if any.
    pub async fn markers(&self, authors: &[UserId]) -> cache::Result<Vec<Option<Score>>> {
        let members: Vec<String> = authors.iter().map(UserId::to_string).collect();
        self.cache.zscore(Self::KEY, &members).await
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::cache::MemoryCache;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    fn timelines(window: usize) -> TimelineCache {
        TimelineCache::new(Arc::new(MemoryCache::new()), window, Duration::from_secs(60))
    }

    fn ids(entries: &[Entry]) -> Vec<&str> {
        entries.iter().map(|entry| entry.tweet_id.as_str()).collect()
    }

    const HOME: Timeline = Timeline::Home(UserId(1));

    #[tokio::test]
    async fn insert_is_idempotent() -> TestResult {
        let tl = timelines(10);
        tl.insert(HOME, &"t1".into(), Score(5)).await?;
        tl.insert(HOME, &"t1".into(), Score(5)).await?;
        tl.insert(HOME, &"t1".into(), Score(9)).await?;
        let entries = tl.range(HOME, 0, 10).await?;
        assert_eq!(entries, vec![Entry::new("t1".into(), Score(5))]);
        Ok(())
    }

    #[tokio::test]
    async fn inserts_trim_to_window() -> TestResult {
        let tl = timelines(800);
        for n in 0..900 {
            tl.insert(HOME, &format!("t{:03}", n).as_str().into(), Score(n)).await?;
        }
        assert_eq!(tl.len(HOME).await?, 800);
        let entries = tl.range(HOME, 0, 1000).await?;
        assert_eq!(entries.len(), 800);
        assert_eq!(entries[0].score, Score(899));
        assert_eq!(entries[799].score, Score(100));
        Ok(())
    }

    #[tokio::test]
    async fn range_respects_offset_and_window() -> TestResult {
        let tl = timelines(3);
        for n in 0..3 {
            tl.insert(HOME, &format!("t{}", n).as_str().into(), Score(n)).await?;
        }
        assert_eq!(ids(&tl.range(HOME, 1, 5).await?), vec!["t1", "t0"]);
        assert!(tl.range(HOME, 3, 5).await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn range_after_breaks_ties_by_id() -> TestResult {
        let tl = timelines(10);
        for (id, score) in [("a", 1), ("b", 2), ("c", 2), ("d", 2), ("e", 3)] {
            tl.insert(HOME, &id.into(), Score(score)).await?;
        }
        let first = tl.range_after(HOME, None, None, 2).await?;
        assert_eq!(ids(&first), vec!["e", "d"]);
        let next = tl.range_after(HOME, first.last(), None, 2).await?;
        assert_eq!(ids(&next), vec!["c", "b"]);
        let last = tl.range_after(HOME, next.last(), None, 2).await?;
        assert_eq!(ids(&last), vec!["a"]);
        Ok(())
    }

    #[tokio::test]
    async fn range_after_honors_floor() -> TestResult {
        let tl = timelines(10);
        for n in 0..5 {
            tl.insert(HOME, &format!("t{}", n).as_str().into(), Score(n)).await?;
        }
        let above_two = tl.range_after(HOME, None, Some(Score(2)), 10).await?;
        assert_eq!(ids(&above_two), vec!["t4", "t3", "t2"]);
        Ok(())
    }

    #[tokio::test]
    async fn remove_and_trim() -> TestResult {
        let tl = timelines(10);
        for n in 0..5 {
            tl.insert(HOME, &format!("t{}", n).as_str().into(), Score(n)).await?;
        }
        assert!(tl.remove(HOME, &"t4".into()).await?);
        assert!(!tl.remove(HOME, &"t4".into()).await?);
        assert_eq!(tl.trim(HOME, 2).await?, 2);
        assert_eq!(ids(&tl.range(HOME, 0, 10).await?), vec!["t3", "t2"]);
        Ok(())
    }

    #[tokio::test]
    async fn timelines_are_incomplete_until_marked() -> TestResult {
        let tl = timelines(3);
        tl.insert(HOME, &"t1".into(), Score(1)).await?;
        assert!(!tl.is_complete(HOME).await?);

        tl.mark_complete(HOME).await?;
        assert!(tl.is_complete(HOME).await?);
        assert_eq!(tl.len(HOME).await?, 1);
        assert_eq!(ids(&tl.range(HOME, 0, 10).await?), vec!["t1"]);
        assert_eq!(ids(&tl.range_after(HOME, None, None, 10).await?), vec!["t1"]);
        Ok(())
    }

    #[tokio::test]
    async fn completeness_survives_trimming_but_not_expiry() -> TestResult {
        let cache = Arc::new(MemoryCache::new());
        let tl = TimelineCache::new(cache.clone(), 3, Duration::from_secs(60));
        tl.mark_complete(HOME).await?;
        for n in 0..5 {
            tl.insert(HOME, &format!("t{}", n).as_str().into(), Score(n)).await?;
        }
        assert!(tl.is_complete(HOME).await?);
        assert_eq!(tl.len(HOME).await?, 3);
        assert_eq!(ids(&tl.range(HOME, 0, 10).await?), vec!["t4", "t3", "t2"]);

        cache.del(&HOME.key()).await?;
        tl.insert(HOME, &"t5".into(), Score(5)).await?;
        assert!(!tl.is_complete(HOME).await?);
        Ok(())
    }

    #[tokio::test]
    async fn entries_keep_exact_scores_the_cache_rounds() -> TestResult {
        let tl = timelines(10);
        // all three round to the same double
        let base = 1_712_345_678_123_456_000;
        let mut entries = Vec::new();
        for offset in 1..=3 {
            let score = Score(base + offset);
            let entry = Entry::new(TweetId::generate(score), score);
            tl.insert(HOME, &entry.tweet_id, score).await?;
            entries.push(entry);
        }
        entries.reverse();
        assert_eq!(tl.range(HOME, 0, 10).await?, entries);

        let mut seen = Vec::new();
        let mut before = None;
        loop {
            let page = tl.range_after(HOME, before.as_ref(), None, 1).await?;
            match page.into_iter().next() {
                Some(entry) => {
                    seen.push(entry.clone());
                    before = Some(entry);
                }
                None => break,
            }
        }
        assert_eq!(seen, entries);

        let rest = tl.range_after(HOME, Some(&entries[1]), None, 10).await?;
        assert_eq!(rest, vec![entries[2].clone()]);
        let above = tl.range_after(HOME, None, Some(entries[1].score), 10).await?;
        assert_eq!(above, entries[..2].to_vec());
        Ok(())
    }

    #[tokio::test]
    async fn pull_only_markers_move_forward() -> TestResult {
        let index = PullOnlyIndex::new(Arc::new(MemoryCache::new()));
        index.mark(UserId(7), Score(50)).await?;
        index.mark(UserId(7), Score(40)).await?;
        assert_eq!(
            index.markers(&[UserId(7), UserId(8)]).await?,
            vec![Some(Score(50)), None]
        );
        Ok(())
    }
}
