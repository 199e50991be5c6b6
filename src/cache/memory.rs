use super::{rank_bounds, Cache, CacheErr, Result, ScoreBound, ZAdd};
use crate::tweet::Score;

use async_trait::async_trait;
use hashbrown::{HashMap, HashSet};
use std::collections::BTreeSet;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Default)]
struct SortedSet {
    ranked: BTreeSet<(Score, String)>,
    scores: HashMap<String, Score>,
}

impl SortedSet {
    fn insert(&mut self, score: Score, member: &str, mode: ZAdd) -> bool {
        let score = score.rounded();
        match self.scores.get(member).copied() {
            None => {
                self.scores.insert(member.to_string(), score);
                self.ranked.insert((score, member.to_string()));
                true
            }
            Some(old) => {
                let replace = match mode {
                    ZAdd::Upsert => old != score,
                    ZAdd::KeepLower => score < old,
                    ZAdd::KeepHigher => score > old,
                };
                if replace {
                    self.ranked.remove(&(old, member.to_string()));
                    self.ranked.insert((score, member.to_string()));
                    self.scores.insert(member.to_string(), score);
                }
                false
            }
        }
    }

    fn remove(&mut self, member: &str) -> bool {
        match self.scores.remove(member) {
            Some(score) => self.ranked.remove(&(score, member.to_string())),
            None => false,
        }
    }

    fn descending(&self) -> impl Iterator<Item = (String, Score)> + '_ {
        self.ranked
            .iter()
            .rev()
            .map(|(score, member)| (member.clone(), *score))
    }
}

#[derive(Debug)]
enum Value {
    Str(String),
    Sorted(SortedSet),
}

#[derive(Debug)]
struct Slot {
    value: Value,
    expires_at: Option<Instant>,
}

#[derive(Debug, Default)]
struct Inner {
    slots: HashMap<String, Slot>,
    unavailable: bool,
    failing_keys: HashSet<String>,
}

impl Inner {
    fn check(&mut self, key: &str) -> Result<()> {
        if self.unavailable {
            Err(CacheErr::Unavailable("connection refused".into()))?
        }
        if self.failing_keys.contains(key) {
            Err(CacheErr::Unavailable(format!("writes to `{}` are failing", key)))?
        }
        let expired = matches!(self.slots.get(key),
                               Some(Slot { expires_at: Some(at), .. }) if *at <= Instant::now());
        if expired {
            self.slots.remove(key);
        }
        Ok(())
    }

    fn sorted(&self, key: &str) -> Result<Option<&SortedSet>> {
        match self.slots.get(key) {
            None => Ok(None),
            Some(Slot {
                value: Value::Sorted(set),
                ..
            }) => Ok(Some(set)),
            Some(_) => Err(wrong_type(key)),
        }
    }

    fn sorted_mut(&mut self, key: &str) -> Result<&mut SortedSet> {
        let slot = self.slots.entry(key.to_string()).or_insert_with(|| Slot {
            value: Value::Sorted(SortedSet::default()),
            expires_at: None,
        });
        match &mut slot.value {
            Value::Sorted(set) => Ok(set),
            Value::Str(_) => Err(wrong_type(key)),
        }
    }

    fn drop_if_empty(&mut self, key: &str) {
        if matches!(self.slots.get(key), Some(Slot { value: Value::Sorted(set), .. }) if set.ranked.is_empty())
        {
            self.slots.remove(key);
        }
    }
}

fn wrong_type(key: &str) -> CacheErr {
    CacheErr::UnexpectedReply(format!(
        "WRONGTYPE operation against `{}` holding the wrong kind of value",
        key
    ))
}

/// An in-process `Cache`.
///
/// Scores are kept as Redis keeps them, rounded to the nearest double.
///
/// Besides standing in for Redis, it can be told to fail: `set_unavailable` makes every
/// call fail, `fail_key` makes calls touching one key fail.
#[derive(Debug, Default)]
pub struct MemoryCache {
    inner: Mutex<Inner>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.lock().unavailable = unavailable;
    }

    pub fn fail_key(&self, key: &str) {
        self.lock().failing_keys.insert(key.to_string());
    }

    pub fn heal_key(&self, key: &str) {
        self.lock().failing_keys.remove(key);
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn zadd(&self, key: &str, members: &[(Score, String)], mode: ZAdd) -> Result<usize> {
        let mut inner = self.lock();
        inner.check(key)?;
        let set = inner.sorted_mut(key)?;
        Ok(members
            .iter()
            .filter(|(score, member)| set.insert(*score, member, mode))
            .count())
    }

    async fn zrem(&self, key: &str, members: &[String]) -> Result<usize> {
        let mut inner = self.lock();
        inner.check(key)?;
        if inner.sorted(key)?.is_none() {
            return Ok(0);
        }
        let set = inner.sorted_mut(key)?;
        let removed = members.iter().filter(|member| set.remove(member)).count();
        inner.drop_if_empty(key);
        Ok(removed)
    }

    async fn zrevrange(&self, key: &str, start: i64, stop: i64) -> Result<Vec<(String, Score)>> {
        let mut inner = self.lock();
        inner.check(key)?;
        Ok(match inner.sorted(key)? {
            None => Vec::new(),
            Some(set) => match rank_bounds(set.ranked.len(), start, stop) {
                None => Vec::new(),
                Some((start, stop)) => set.descending().skip(start).take(stop - start + 1).collect(),
            },
        })
    }

    async fn zrevrange_by_score(
        &self,
        key: &str,
        max: ScoreBound,
        min: ScoreBound,
        offset: usize,
        count: usize,
    ) -> Result<Vec<(String, Score)>> {
        let mut inner = self.lock();
        inner.check(key)?;
        Ok(match inner.sorted(key)? {
            None => Vec::new(),
            Some(set) => set
                .descending()
                .skip_while(|(_, score)| !max.admits_below(*score))
                .take_while(|(_, score)| min.admits_above(*score))
                .skip(offset)
                .take(count)
                .collect(),
        })
    }

    async fn zscore(&self, key: &str, members: &[String]) -> Result<Vec<Option<Score>>> {
        let mut inner = self.lock();
        inner.check(key)?;
        let set = inner.sorted(key)?;
        Ok(members
            .iter()
            .map(|member| set.and_then(|set| set.scores.get(member).copied()))
            .collect())
    }

    async fn zcard(&self, key: &str) -> Result<usize> {
        let mut inner = self.lock();
        inner.check(key)?;
        Ok(inner.sorted(key)?.map_or(0, |set| set.ranked.len()))
    }

    async fn zremrangebyrank(&self, key: &str, start: i64, stop: i64) -> Result<usize> {
        let mut inner = self.lock();
        inner.check(key)?;
        let doomed: Vec<String> = match inner.sorted(key)? {
            None => return Ok(0),
            Some(set) => match rank_bounds(set.ranked.len(), start, stop) {
                None => return Ok(0),
                Some((start, stop)) => set
                    .ranked
                    .iter()
                    .skip(start)
                    .take(stop - start + 1)
                    .map(|(_, member)| member.clone())
                    .collect(),
            },
        };
        let set = inner.sorted_mut(key)?;
        for member in &doomed {
            set.remove(member);
        }
        inner.drop_if_empty(key);
        Ok(doomed.len())
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        let mut inner = self.lock();
        inner.check(key)?;
        Ok(match inner.slots.get_mut(key) {
            Some(slot) => {
                slot.expires_at = Some(Instant::now() + ttl);
                true
            }
            None => false,
        })
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut inner = self.lock();
        inner.check(key)?;
        match inner.slots.get(key) {
            None => Ok(None),
            Some(Slot {
                value: Value::Str(value),
                ..
            }) => Ok(Some(value.clone())),
            Some(_) => Err(wrong_type(key)),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        let mut inner = self.lock();
        inner.check(key)?;
        inner.slots.insert(
            key.to_string(),
            Slot {
                value: Value::Str(value.to_string()),
                expires_at: ttl.map(|ttl| Instant::now() + ttl),
            },
        );
        Ok(())
    }

    async fn set_nx(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        let mut inner = self.lock();
        inner.check(key)?;
        if inner.slots.contains_key(key) {
            return Ok(false);
        }
        inner.slots.insert(
            key.to_string(),
            Slot {
                value: Value::Str(value.to_string()),
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(true)
    }

    async fn incr(&self, key: &str) -> Result<i64> {
        let mut inner = self.lock();
        inner.check(key)?;
        let slot = inner.slots.entry(key.to_string()).or_insert_with(|| Slot {
            value: Value::Str("0".to_string()),
            expires_at: None,
        });
        match &mut slot.value {
            Value::Str(value) => {
                let next = value
                    .parse::<i64>()
                    .map_err(|_| CacheErr::UnexpectedReply(format!("`{}` is not an integer", key)))?
                    + 1;
                *value = next.to_string();
                Ok(next)
            }
            Value::Sorted(_) => Err(wrong_type(key)),
        }
    }

    async fn del(&self, key: &str) -> Result<bool> {
        let mut inner = self.lock();
        inner.check(key)?;
        Ok(inner.slots.remove(key).is_some())
    }
}
