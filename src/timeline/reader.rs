//! Builds pages of home and author timelines.
//!
//! A home timeline page is the merge of the user's materialized home timeline (everything
//! pushed to it) with the author timelines of the followed authors whose tweets are only
//! pulled.  The page is then hydrated with one batch read from persistence.
//!
//! When the home timeline has never been built (or expired and was started over by a later
//! push), the reader builds it from the followed authors' timelines and writes it back.
//! Author timelines that are incomplete the same way are refilled from persistence.  When the cache fails, the page is
//! built straight from persistence instead, without any write-back.
use super::{clamp_limit, merge_desc, Cursor, Entry, PullOnlyIndex, Timeline, TimelineCache};
use crate::deadline::Deadline;
use crate::error::Error;
use crate::store::{Graph, Persistence};
use crate::tweet::{Score, Tweet, TweetId, UserId};

use futures::{stream, StreamExt, TryStreamExt};
use serde::Serialize;
use std::iter;
use std::sync::Arc;

type Result<T> = std::result::Result<T, Error>;

/// How many followed authors are read from at once.
const FETCH_PARALLELISM: usize = 16;

#[derive(Serialize, Debug, Clone, PartialEq, Default)]
pub struct Page {
    pub tweets: Vec<Tweet>,
    pub next_cursor: Option<Cursor>,
    pub has_more: bool,
}

pub struct Reader {
    timelines: TimelineCache,
    pull_only: PullOnlyIndex,
    store: Arc<dyn Persistence>,
    graph: Arc<dyn Graph>,
}

impl Reader {
    pub fn new(
        timelines: TimelineCache,
        pull_only: PullOnlyIndex,
        store: Arc<dyn Persistence>,
        graph: Arc<dyn Graph>,
    ) -> Self {
        Self {
            timelines,
            pull_only,
            store,
            graph,
        }
    }

    pub async fn home_timeline(
        &self,
        user: UserId,
        cursor: Option<Cursor>,
        limit: Option<usize>,
        deadline: Deadline,
    ) -> Result<Page> {
        let limit = clamp_limit(limit);
        let before = cursor.as_ref().map(Cursor::entry);
        deadline
            .run(async {
                match self.home_from_cache(user, before, limit).await {
                    Err(Error::Cache(e)) => {
                        log::warn!("Serving home timeline of {} from persistence: {}", user, e);
                        self.home_from_store(user, before, limit).await
                    }
                    res => res,
                }
            })
            .await
    }

    pub async fn author_timeline(
        &self,
        author: UserId,
        cursor: Option<Cursor>,
        limit: Option<usize>,
        deadline: Deadline,
    ) -> Result<Page> {
        let limit = clamp_limit(limit);
        let before = cursor.as_ref().map(Cursor::entry);
        deadline
            .run(async {
                match self.author_from_cache(author, before, limit).await {
                    Err(Error::Cache(e)) => {
                        log::warn!("Serving author timeline of {} from persistence: {}", author, e);
                        let entries = self
                            .store
                            .list_author_tweet_ids(author, None, before, limit + 1)
                            .await?;
                        self.page(None, entries, limit).await
                    }
                    res => res,
                }
            })
            .await
    }

    async fn home_from_cache(
        &self,
        user: UserId,
        before: Option<&Entry>,
        limit: usize,
    ) -> Result<Page> {
        let home = Timeline::Home(user);
        if before.is_none() && !self.timelines.is_complete(home).await? {
            return self.home_cold(user, limit).await;
        }
        let pushed = self
            .timelines
            .range_after(home, before, None, limit + 1)
            .await?;

        let following = self.graph.following(user).await?;
        let markers = self.pull_only.markers(&following).await?;
        // once the pushed entries alone overflow the page, older pulled entries cannot
        // make it onto the page; markers come back rounded, so they are compared rounded
        let floor = if pushed.len() > limit {
            Some(pushed[limit - 1].score)
        } else {
            None
        };
        let pull_authors: Vec<UserId> = following
            .into_iter()
            .zip(markers)
            .filter_map(|(author, marker)| match (marker, floor) {
                (Some(marker), Some(floor)) if marker.rounded() < floor.rounded() => None,
                (Some(_), _) => Some(author),
                (None, _) => None,
            })
            .collect();

        let pulled: Vec<Vec<Entry>> = stream::iter(pull_authors)
            .map(|author| self.author_entries(author, before, floor, limit + 1))
            .buffer_unordered(FETCH_PARALLELISM)
            .try_collect()
            .await?;

        let merged = merge_desc(iter::once(pushed).chain(pulled));
        self.page(Some(home), merged, limit).await
    }

    /// Builds an incomplete home timeline from the followed authors' timelines, writes the
    /// pushed part of it back, and marks it complete.
    async fn home_cold(&self, user: UserId, limit: usize) -> Result<Page> {
        let following = self.graph.following(user).await?;
        if following.is_empty() {
            return Ok(Page::default());
        }
        let markers = self.pull_only.markers(&following).await?;
        let window = self.timelines.window();

        let per_author: Vec<(bool, Vec<Entry>)> = stream::iter(following.into_iter().zip(markers))
            .map(|(author, marker)| async move {
                let entries = self.author_entries(author, None, None, window).await?;
                Ok::<_, Error>((marker.is_none(), entries))
            })
            .buffer_unordered(FETCH_PARALLELISM)
            .try_collect()
            .await?;

        let mut pushable = merge_desc(
            per_author
                .iter()
                .filter(|(pushed, _)| *pushed)
                .map(|(_, entries)| entries.clone()),
        );
        pushable.truncate(window);
        let home = Timeline::Home(user);
        self.timelines.insert_many(home, &pushable).await?;
        self.timelines.mark_complete(home).await?;
        log::debug!(
            "Rebuilt home timeline of {} with {} entries",
            user,
            pushable.len()
        );

        let merged = merge_desc(per_author.into_iter().map(|(_, entries)| entries));
        self.page(Some(home), merged, limit).await
    }

    async fn home_from_store(
        &self,
        user: UserId,
        before: Option<&Entry>,
        limit: usize,
    ) -> Result<Page> {
        let following = self.graph.following(user).await?;
        let lists: Vec<Vec<Entry>> = stream::iter(following)
            .map(|author| {
                self.store
                    .list_author_tweet_ids(author, None, before, limit + 1)
            })
            .buffer_unordered(FETCH_PARALLELISM)
            .try_collect()
            .await?;
        self.page(None, merge_desc(lists), limit).await
    }

    async fn author_from_cache(
        &self,
        author: UserId,
        before: Option<&Entry>,
        limit: usize,
    ) -> Result<Page> {
        let entries = self.author_entries(author, before, None, limit + 1).await?;
        self.page(Some(Timeline::Author(author)), entries, limit).await
    }

    /// Up to `n` of the author's entries below `before` and at or above `floor`: from the
    /// cache, refilled from persistence first when incomplete, and topped up from
    /// persistence once read past its window.
    async fn author_entries(
        &self,
        author: UserId,
        before: Option<&Entry>,
        floor: Option<Score>,
        n: usize,
    ) -> Result<Vec<Entry>> {
        let tl = Timeline::Author(author);
        if !self.timelines.is_complete(tl).await? {
            self.refill_author(author).await?;
        }
        let mut entries = self.timelines.range_after(tl, before, floor, n).await?;
        if entries.len() < n && self.timelines.len(tl).await? >= self.timelines.window() {
            let resume = entries.last().cloned().or_else(|| before.cloned());
            let more = self
                .store
                .list_author_tweet_ids(author, floor, resume.as_ref(), n - entries.len())
                .await?;
            entries.extend(more);
        }
        Ok(entries)
    }

    async fn refill_author(&self, author: UserId) -> Result<()> {
        let tl = Timeline::Author(author);
        let entries = self
            .store
            .list_author_tweet_ids(author, None, None, self.timelines.window())
            .await?;
        self.timelines.insert_many(tl, &entries).await?;
        self.timelines.mark_complete(tl).await?;
        log::debug!("Refilled {} with {} entries", tl, entries.len());
        Ok(())
    }

    /// Cuts `merged` down to one page and hydrates it.  Entries whose tweet no longer
    /// exists are dropped, and removed from `tl` when given.
    async fn page(&self, tl: Option<Timeline>, mut merged: Vec<Entry>, limit: usize) -> Result<Page> {
        let has_more = merged.len() > limit;
        merged.truncate(limit);

        let ids: Vec<TweetId> = merged.iter().map(|e| e.tweet_id.clone()).collect();
        let mut found = self.store.batch_get_tweets(&ids).await?;
        let mut tweets = Vec::with_capacity(merged.len());
        for entry in &merged {
            match (found.remove(&entry.tweet_id), tl) {
                (Some(tweet), _) => tweets.push(tweet),
                (None, Some(tl)) => self.forget(tl, &entry.tweet_id).await,
                (None, None) => (),
            }
        }

        Ok(Page {
            tweets,
            next_cursor: merged.last().cloned().map(Cursor).filter(|_| has_more),
            has_more,
        })
    }

    async fn forget(&self, tl: Timeline, tweet_id: &TweetId) {
        match self.timelines.remove(tl, tweet_id).await {
            Ok(true) => log::debug!("Removed deleted tweet {} from {}", tweet_id, tl),
            Ok(false) => (),
            Err(e) => log::debug!("Could not remove deleted tweet {} from {}: {}", tweet_id, tl, e),
        }
    }
}
