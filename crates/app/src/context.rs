//! App Context

use std::sync::Arc;

use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::{
    cache::{CacheError, RedisCacheStore},
    catalogue::YamlCatalogue,
    codes::CodePool,
    config::{CacheConfig, ConfigError, DatabaseConfig, ServiceConfig},
    database,
    reconciliation::{ChannelError, InProcessChannel, MessageChannel, Reconciler},
    service::CouponsService,
    state::CouponStateCache,
    store::PgCouponStore,
};

#[derive(Debug, Error)]
pub enum AppInitError {
    #[error("invalid configuration")]
    Config(#[from] ConfigError),

    #[error("failed to connect to cache")]
    Cache(#[source] CacheError),

    #[error("failed to connect to database")]
    Database(#[source] sqlx::Error),

    #[error("failed to subscribe reconciler")]
    Channel(#[from] ChannelError),
}

/// Wired services plus the in-process reconciler task.
pub struct AppContext {
    pub service: CouponsService,
    pub codes: CodePool,
    reconciler: JoinHandle<()>,
}

impl std::fmt::Debug for AppContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppContext")
            .field("service", &self.service)
            .finish_non_exhaustive()
    }
}

impl AppContext {
    /// Connect to Redis and `PostgreSQL`, wire the service and start reconciling.
    ///
    /// # Errors
    ///
    /// Returns an error when the configuration is invalid or a backend is unreachable.
    pub async fn connect(
        cache: &CacheConfig,
        database: &DatabaseConfig,
        service: &ServiceConfig,
        catalogue: YamlCatalogue,
    ) -> Result<Self, AppInitError> {
        let settings = service.settings()?;

        let cache_store = Arc::new(
            RedisCacheStore::connect(&cache.redis_url)
                .await
                .map_err(AppInitError::Cache)?,
        );

        let pool = database::connect(&database.database_url)
            .await
            .map_err(AppInitError::Database)?;

        let store = Arc::new(PgCouponStore::new(pool));
        let channel = Arc::new(InProcessChannel::new());
        let subscription = channel.subscribe(&settings.topic).await?;

        let reconciler = tokio::spawn(Reconciler::new(store.clone()).run(subscription));
        let codes = CodePool::new(cache_store.clone());

        let service = CouponsService::new(
            CouponStateCache::new(cache_store, cache.ttl_band()),
            codes.clone(),
            store,
            Arc::new(catalogue),
            channel,
            settings,
        );

        Ok(Self {
            service,
            codes,
            reconciler,
        })
    }

    /// Drop the service and wait for the reconciler to drain published events.
    pub async fn shutdown(self) {
        drop(self.service);

        if let Err(error) = self.reconciler.await {
            error!(%error, "reconciler task failed");
        }

        debug!("reconciler drained");
    }
}
