use super::{Graph, OutboxEntry, Persistence, Result};
use crate::error::Error;
use crate::timeline::Entry;
use crate::tweet::{Score, Tweet, TweetId, UserId};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hashbrown::{HashMap, HashSet};
use std::collections::BTreeSet;
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct State {
    tweets: HashMap<TweetId, Tweet>,
    by_author: HashMap<UserId, BTreeSet<Entry>>,
    client_ids: HashSet<(UserId, String)>,
    outbox: HashMap<TweetId, OutboxEntry>,
    followers: HashMap<UserId, BTreeSet<UserId>>,
    following: HashMap<UserId, BTreeSet<UserId>>,
    unavailable: bool,
    failing_puts: u32,
    lost_put_acks: u32,
}

/// Tweets, outbox, and follow graph held in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn follow(&self, follower: UserId, author: UserId) {
        let mut state = self.lock();
        state.followers.entry(author).or_default().insert(follower);
        state.following.entry(follower).or_default().insert(author);
    }

    pub fn unfollow(&self, follower: UserId, author: UserId) {
        let mut state = self.lock();
        if let Some(followers) = state.followers.get_mut(&author) {
            followers.remove(&follower);
        }
        if let Some(following) = state.following.get_mut(&follower) {
            following.remove(&author);
        }
    }

    /// Makes every call fail with a persistence error until called again with `false`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.lock().unavailable = unavailable;
    }

    /// Makes the next `n` calls to `put_tweet` fail with a persistence error.
    pub fn fail_next_puts(&self, n: u32) {
        self.lock().failing_puts = n;
    }

    /// Makes the next `n` calls to `put_tweet` store the tweet and then fail anyway, like a
    /// commit whose acknowledgement never arrived.
    pub fn lose_next_put_acks(&self, n: u32) {
        self.lock().lost_put_acks = n;
    }

    pub fn tweet_count(&self) -> usize {
        self.lock().tweets.len()
    }

    pub fn outbox_len(&self) -> usize {
        self.lock().outbox.len()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check(state: &State) -> Result<()> {
        if state.unavailable {
            Err(Error::Persistence("database unavailable".into()))?
        }
        Ok(())
    }
}

#[async_trait]
impl Persistence for MemoryStore {
    async fn put_tweet(&self, tweet: &Tweet) -> Result<()> {
        let mut state = self.lock();
        Self::check(&state)?;
        if state.failing_puts > 0 {
            state.failing_puts -= 1;
            Err(Error::Persistence("connection reset".into()))?
        }
        if state.tweets.contains_key(&tweet.id) {
            return Ok(());
        }
        if let Some(client_id) = &tweet.client_id {
            if !state.client_ids.insert((tweet.author_id, client_id.clone())) {
                Err(Error::Conflict(
                    "a tweet with this client_id already exists".into(),
                ))?
            }
        }
        state
            .by_author
            .entry(tweet.author_id)
            .or_default()
            .insert(Entry::new(tweet.id.clone(), tweet.score()));
        state.outbox.insert(
            tweet.id.clone(),
            OutboxEntry {
                tweet_id: tweet.id.clone(),
                author_id: tweet.author_id,
                attempts: 0,
                created_at: tweet.created_at,
            },
        );
        state.tweets.insert(tweet.id.clone(), tweet.clone());
        if state.lost_put_acks > 0 {
            state.lost_put_acks -= 1;
            Err(Error::Persistence("connection reset after commit".into()))?
        }
        Ok(())
    }

    async fn get_tweet(&self, id: &TweetId) -> Result<Option<Tweet>> {
        let state = self.lock();
        Self::check(&state)?;
        Ok(state.tweets.get(id).cloned())
    }

    async fn batch_get_tweets(&self, ids: &[TweetId]) -> Result<HashMap<TweetId, Tweet>> {
        let state = self.lock();
        Self::check(&state)?;
        Ok(ids
            .iter()
            .filter_map(|id| state.tweets.get(id).map(|t| (id.clone(), t.clone())))
            .collect())
    }

    async fn list_author_tweet_ids(
        &self,
        author: UserId,
        since: Option<Score>,
        before: Option<&Entry>,
        limit: usize,
    ) -> Result<Vec<Entry>> {
        let state = self.lock();
        Self::check(&state)?;
        Ok(state
            .by_author
            .get(&author)
            .map(|entries| {
                entries
                    .iter()
                    .rev()
                    .filter(|entry| before.map_or(true, |before| *entry < before))
                    .take_while(|entry| since.map_or(true, |since| entry.score >= since))
                    .take(limit)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn delete_tweet(&self, id: &TweetId) -> Result<bool> {
        let mut state = self.lock();
        Self::check(&state)?;
        let tweet = match state.tweets.remove(id) {
            Some(tweet) => tweet,
            None => return Ok(false),
        };
        if let Some(entries) = state.by_author.get_mut(&tweet.author_id) {
            entries.remove(&Entry::new(tweet.id.clone(), tweet.score()));
        }
        if let Some(client_id) = tweet.client_id {
            state.client_ids.remove(&(tweet.author_id, client_id));
        }
        state.outbox.remove(id);
        Ok(true)
    }

    async fn outbox_pending(
        &self,
        older_than: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<OutboxEntry>> {
        let state = self.lock();
        Self::check(&state)?;
        let mut pending: Vec<OutboxEntry> = state
            .outbox
            .values()
            .filter(|entry| entry.created_at < older_than)
            .cloned()
            .collect();
        pending.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        pending.truncate(limit);
        Ok(pending)
    }

    async fn outbox_ack(&self, id: &TweetId) -> Result<()> {
        let mut state = self.lock();
        Self::check(&state)?;
        state.outbox.remove(id);
        Ok(())
    }

    async fn outbox_bump(&self, id: &TweetId) -> Result<u32> {
        let mut state = self.lock();
        Self::check(&state)?;
        let entry = state
            .outbox
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(format!("outbox entry for {}", id)))?;
        entry.attempts += 1;
        Ok(entry.attempts)
    }
}

#[async_trait]
impl Graph for MemoryStore {
    async fn followers(
        &self,
        author: UserId,
        after: Option<UserId>,
        limit: usize,
    ) -> Result<Vec<UserId>> {
        let state = self.lock();
        Self::check(&state)?;
        Ok(state
            .followers
            .get(&author)
            .map(|followers| {
                followers
                    .iter()
                    .filter(|id| after.map_or(true, |after| **id > after))
                    .take(limit)
                    .copied()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn following(&self, user: UserId) -> Result<Vec<UserId>> {
        let state = self.lock();
        Self::check(&state)?;
        Ok(state
            .following
            .get(&user)
            .map(|authors| authors.iter().copied().collect())
            .unwrap_or_default())
    }

    async fn follower_count(&self, author: UserId) -> Result<u64> {
        let state = self.lock();
        Self::check(&state)?;
        Ok(state.followers.get(&author).map_or(0, |f| f.len() as u64))
    }
}
