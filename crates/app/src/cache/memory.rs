//! In-memory cache store

use std::collections::VecDeque;

use async_trait::async_trait;
use rustc_hash::FxHashMap;
use tokio::{
    sync::Mutex,
    time::{Duration, Instant},
};

use crate::cache::{CacheError, CacheOp, CacheStore, Pipeline};

#[derive(Debug)]
enum Value {
    Hash(FxHashMap<String, String>),
    List(VecDeque<String>),
}

#[derive(Debug)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|deadline| deadline > now)
    }
}

/// Process-local [`CacheStore`] keeping every key behind one lock.
///
/// Expiry follows the tokio clock, so paused-time tests can advance past a TTL.
#[derive(Debug, Default)]
pub struct InMemoryCacheStore {
    entries: Mutex<FxHashMap<String, Entry>>,
}

impl InMemoryCacheStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Remaining time to live of `key`, if it exists and has an expiry.
    pub async fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        let entries = self.entries.lock().await;

        entries
            .get(key)
            .filter(|entry| entry.is_live(now))
            .and_then(|entry| entry.expires_at)
            .map(|deadline| deadline.saturating_duration_since(now))
    }

    /// Whether `key` holds a live value.
    pub async fn contains_key(&self, key: &str) -> bool {
        let now = Instant::now();

        self.entries
            .lock()
            .await
            .get(key)
            .is_some_and(|entry| entry.is_live(now))
    }
}

fn purge(entries: &mut FxHashMap<String, Entry>, key: &str, now: Instant) {
    if entries.get(key).is_some_and(|entry| !entry.is_live(now)) {
        entries.remove(key);
    }
}

fn check(entries: &FxHashMap<String, Entry>, op: &CacheOp) -> Result<(), CacheError> {
    match op {
        CacheOp::HashSet { key, .. } | CacheOp::HashDelete { key, .. } => {
            match entries.get(key).map(|entry| &entry.value) {
                Some(Value::List(_)) => Err(CacheError::WrongType(key.clone())),
                Some(Value::Hash(_)) | None => Ok(()),
            }
        }
        CacheOp::Expire { .. } => Ok(()),
    }
}

fn apply(entries: &mut FxHashMap<String, Entry>, op: CacheOp, now: Instant) {
    match op {
        CacheOp::HashSet { key, entries: fields } => {
            let entry = entries.entry(key).or_insert_with(|| Entry {
                value: Value::Hash(FxHashMap::default()),
                expires_at: None,
            });

            if let Value::Hash(hash) = &mut entry.value {
                hash.extend(fields);
            }
        }
        CacheOp::HashDelete { key, fields } => {
            let emptied = match entries.get_mut(&key).map(|entry| &mut entry.value) {
                Some(Value::Hash(hash)) => {
                    for field in &fields {
                        hash.remove(field);
                    }

                    hash.is_empty()
                }
                Some(Value::List(_)) | None => false,
            };

            if emptied {
                entries.remove(&key);
            }
        }
        CacheOp::Expire { key, ttl } => {
            if let Some(entry) = entries.get_mut(&key) {
                entry.expires_at = Some(now + ttl);
            }
        }
    }
}

#[async_trait]
impl CacheStore for InMemoryCacheStore {
    async fn hash_get_all(&self, key: &str) -> Result<FxHashMap<String, String>, CacheError> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;

        purge(&mut entries, key, now);

        match entries.get(key).map(|entry| &entry.value) {
            Some(Value::Hash(hash)) => Ok(hash.clone()),
            Some(Value::List(_)) => Err(CacheError::WrongType(key.to_string())),
            None => Ok(FxHashMap::default()),
        }
    }

    async fn execute(&self, pipeline: Pipeline) -> Result<(), CacheError> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;

        let ops = pipeline.into_ops();

        for op in &ops {
            match op {
                CacheOp::HashSet { key, .. }
                | CacheOp::HashDelete { key, .. }
                | CacheOp::Expire { key, .. } => purge(&mut entries, key, now),
            }
        }

        // Validate the whole batch before the first write.
        for op in &ops {
            check(&entries, op)?;
        }

        for op in ops {
            apply(&mut entries, op, now);
        }

        Ok(())
    }

    async fn list_push(&self, key: &str, values: Vec<String>) -> Result<usize, CacheError> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;

        purge(&mut entries, key, now);

        let entry = entries.entry(key.to_string()).or_insert_with(|| Entry {
            value: Value::List(VecDeque::new()),
            expires_at: None,
        });

        match &mut entry.value {
            Value::List(list) => {
                list.extend(values);

                Ok(list.len())
            }
            Value::Hash(_) => Err(CacheError::WrongType(key.to_string())),
        }
    }

    async fn list_pop(&self, key: &str) -> Result<Option<String>, CacheError> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;

        purge(&mut entries, key, now);

        let (popped, emptied) = match entries.get_mut(key).map(|entry| &mut entry.value) {
            Some(Value::List(list)) => (list.pop_front(), list.is_empty()),
            Some(Value::Hash(_)) => return Err(CacheError::WrongType(key.to_string())),
            None => (None, false),
        };

        if emptied {
            entries.remove(key);
        }

        Ok(popped)
    }
}
