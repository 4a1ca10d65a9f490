//! Cache Config

use std::time::Duration;

use clap::Args;

use crate::state::TtlBand;

/// Redis and partition expiry settings.
#[derive(Debug, Args)]
pub struct CacheConfig {
    /// Redis connection string
    #[arg(long, env = "REDIS_URL", default_value = "redis://127.0.0.1:6379", hide_env_values = true)]
    pub redis_url: String,

    /// Shortest partition expiry, in seconds
    #[arg(long, env = "CACHE_TTL_MIN_SECS", default_value_t = 3_600)]
    pub cache_ttl_min_secs: u64,

    /// Longest partition expiry, in seconds
    #[arg(long, env = "CACHE_TTL_MAX_SECS", default_value_t = 7_200)]
    pub cache_ttl_max_secs: u64,
}

impl CacheConfig {
    /// Band partition expiries are drawn from.
    #[must_use]
    pub fn ttl_band(&self) -> TtlBand {
        TtlBand::new(
            Duration::from_secs(self.cache_ttl_min_secs),
            Duration::from_secs(self.cache_ttl_max_secs),
        )
    }
}
