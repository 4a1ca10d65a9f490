//! Redis cache store

use std::num::NonZeroUsize;

use async_trait::async_trait;
use redis::{AsyncCommands, Client, aio::ConnectionManager};
use rustc_hash::FxHashMap;
use tracing::debug;

use crate::cache::{CacheError, CacheOp, CacheStore, Pipeline};

/// [`CacheStore`] backed by Redis, sharing one managed connection.
#[derive(Clone)]
pub struct RedisCacheStore {
    conn_manager: ConnectionManager,
}

impl std::fmt::Debug for RedisCacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisCacheStore").finish_non_exhaustive()
    }
}

impl RedisCacheStore {
    /// Connect to Redis.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid or the connection cannot be established.
    pub async fn connect(redis_url: &str) -> Result<Self, CacheError> {
        let client = Client::open(redis_url)?;
        let conn_manager = ConnectionManager::new(client).await?;

        Ok(Self { conn_manager })
    }
}

fn ttl_seconds(ttl: std::time::Duration) -> i64 {
    i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX).max(1)
}

#[async_trait]
impl CacheStore for RedisCacheStore {
    async fn hash_get_all(&self, key: &str) -> Result<FxHashMap<String, String>, CacheError> {
        let mut conn = self.conn_manager.clone();

        Ok(conn.hgetall(key).await?)
    }

    async fn execute(&self, pipeline: Pipeline) -> Result<(), CacheError> {
        if pipeline.is_empty() {
            return Ok(());
        }

        let mut conn = self.conn_manager.clone();
        let mut pipe = redis::pipe();

        pipe.atomic();

        for op in pipeline.ops() {
            match op {
                CacheOp::HashSet { key, entries } => {
                    pipe.hset_multiple(key, entries.as_slice()).ignore();
                }
                CacheOp::HashDelete { key, fields } => {
                    pipe.hdel(key, fields).ignore();
                }
                CacheOp::Expire { key, ttl } => {
                    pipe.expire(key, ttl_seconds(*ttl)).ignore();
                }
            }
        }

        let () = pipe.query_async(&mut conn).await?;

        debug!(ops = pipeline.ops().len(), "applied cache pipeline");

        Ok(())
    }

    async fn list_push(&self, key: &str, values: Vec<String>) -> Result<usize, CacheError> {
        if values.is_empty() {
            let mut conn = self.conn_manager.clone();

            return Ok(conn.llen(key).await?);
        }

        let mut conn = self.conn_manager.clone();

        Ok(conn.rpush(key, values).await?)
    }

    async fn list_pop(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.conn_manager.clone();

        Ok(conn.lpop(key, None::<NonZeroUsize>).await?)
    }
}
