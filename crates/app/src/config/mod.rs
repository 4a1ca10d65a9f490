//! Application configuration
//!
//! Settings are grouped by concern and flattened into the commands that need them. Every
//! setting can be given as a flag or through the environment, and a `.env` file is loaded
//! first if present.

use thiserror::Error;

pub mod cache;
pub mod db;
pub mod observability;
pub mod service;

pub use cache::CacheConfig;
pub use db::DatabaseConfig;
pub use observability::{LogFormat, LoggingConfig};
pub use service::ServiceConfig;

/// Configuration values that parse but make no sense.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Currency code is not an ISO 4217 currency.
    #[error("unknown currency: {0}")]
    UnknownCurrency(String),

    /// Minimum payable amount must be positive.
    #[error("minimum payable amount must be at least one minor unit, got {0}")]
    InvalidMinimumCost(i64),
}
