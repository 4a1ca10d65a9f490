//! Cache Store
//!
//! A key/value store holding hash maps and lists, with per-key expiry. Writes that touch
//! several keys are batched into a [`Pipeline`] and applied all-or-nothing.

use std::time::Duration;

use async_trait::async_trait;
use mockall::automock;
use rustc_hash::FxHashMap;
use thiserror::Error;

pub mod memory;
pub mod redis;

pub use self::{memory::InMemoryCacheStore, redis::RedisCacheStore};

/// Cache store errors.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The backend rejected or failed the command.
    #[error("cache backend error")]
    Backend(#[source] ::redis::RedisError),

    /// A key held a value of a different shape than the command expects.
    #[error("wrong value type at key {0}")]
    WrongType(String),
}

impl From<::redis::RedisError> for CacheError {
    fn from(error: ::redis::RedisError) -> Self {
        Self::Backend(error)
    }
}

/// A single write inside a [`Pipeline`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CacheOp {
    /// Set `entries` on the hash at `key`, creating it if needed.
    HashSet {
        /// Hash key
        key: String,

        /// Field/value pairs
        entries: Vec<(String, String)>,
    },

    /// Remove `fields` from the hash at `key`.
    HashDelete {
        /// Hash key
        key: String,

        /// Fields to remove
        fields: Vec<String>,
    },

    /// Expire `key` after `ttl`.
    Expire {
        /// Key
        key: String,

        /// Time to live
        ttl: Duration,
    },
}

/// An ordered batch of writes applied atomically.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Pipeline {
    ops: Vec<CacheOp>,
}

impl Pipeline {
    /// Creates an empty pipeline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a hash write. Empty writes are skipped.
    #[must_use]
    pub fn hash_set(mut self, key: &str, entries: Vec<(String, String)>) -> Self {
        if !entries.is_empty() {
            self.ops.push(CacheOp::HashSet {
                key: key.to_string(),
                entries,
            });
        }

        self
    }

    /// Queue a hash field removal. Empty removals are skipped.
    #[must_use]
    pub fn hash_delete(mut self, key: &str, fields: Vec<String>) -> Self {
        if !fields.is_empty() {
            self.ops.push(CacheOp::HashDelete {
                key: key.to_string(),
                fields,
            });
        }

        self
    }

    /// Queue an expiry reset.
    #[must_use]
    pub fn expire(mut self, key: &str, ttl: Duration) -> Self {
        self.ops.push(CacheOp::Expire {
            key: key.to_string(),
            ttl,
        });

        self
    }

    /// Whether nothing has been queued.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Queued writes, in order.
    pub fn ops(&self) -> &[CacheOp] {
        &self.ops
    }

    /// Consume the pipeline, returning its writes.
    pub fn into_ops(self) -> Vec<CacheOp> {
        self.ops
    }
}

/// Hash-map and list store with per-key expiry.
#[automock]
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Every field of the hash at `key`; empty when the key does not exist.
    async fn hash_get_all(&self, key: &str) -> Result<FxHashMap<String, String>, CacheError>;

    /// Apply every write in `pipeline` atomically.
    async fn execute(&self, pipeline: Pipeline) -> Result<(), CacheError>;

    /// Append `values` to the list at `key`, returning the new list length.
    async fn list_push(&self, key: &str, values: Vec<String>) -> Result<usize, CacheError>;

    /// Pop one value from the head of the list at `key`.
    async fn list_pop(&self, key: &str) -> Result<Option<String>, CacheError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipeline_skips_empty_writes() {
        let pipeline = Pipeline::new()
            .hash_set("a", Vec::new())
            .hash_delete("a", Vec::new())
            .expire("a", Duration::from_secs(1));

        assert_eq!(
            pipeline.ops(),
            [CacheOp::Expire {
                key: "a".to_string(),
                ttl: Duration::from_secs(1),
            }]
        );
    }

    #[test]
    fn pipeline_keeps_order() {
        let pipeline = Pipeline::new()
            .hash_delete("a", vec!["x".to_string()])
            .hash_set("b", vec![("y".to_string(), "1".to_string())]);

        assert!(matches!(
            pipeline.ops(),
            [CacheOp::HashDelete { .. }, CacheOp::HashSet { .. }]
        ));
    }
}
