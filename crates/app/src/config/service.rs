//! Service Config

use clap::Args;
use rusty_money::{Findable, iso::Currency};

use crate::{config::ConfigError, reconciliation::DEFAULT_TOPIC, service::ServiceSettings};

/// Settlement and reconciliation settings.
#[derive(Debug, Args)]
pub struct ServiceConfig {
    /// ISO 4217 code of the settlement currency
    #[arg(long, env = "SETTLEMENT_CURRENCY", default_value = "CNY")]
    pub currency: String,

    /// Minimum payable amount, in minor units of the settlement currency
    #[arg(long, env = "SETTLEMENT_MIN_COST_MINOR", default_value_t = 1)]
    pub min_cost_minor: i64,

    /// Topic status changes are published on
    #[arg(long, env = "COUPON_TOPIC", default_value = DEFAULT_TOPIC)]
    pub topic: String,
}

impl ServiceConfig {
    /// The configured settlement currency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownCurrency`] if the code is not an ISO currency.
    pub fn currency(&self) -> Result<&'static Currency, ConfigError> {
        Currency::find(&self.currency.to_ascii_uppercase())
            .ok_or_else(|| ConfigError::UnknownCurrency(self.currency.clone()))
    }

    /// Validated settings for [`CouponsService`](crate::service::CouponsService).
    ///
    /// # Errors
    ///
    /// Returns an error if the currency is unknown or the minimum cost is not positive.
    pub fn settings(&self) -> Result<ServiceSettings, ConfigError> {
        if self.min_cost_minor < 1 {
            return Err(ConfigError::InvalidMinimumCost(self.min_cost_minor));
        }

        Ok(ServiceSettings {
            topic: self.topic.clone(),
            currency: self.currency()?,
            min_cost_minor: self.min_cost_minor,
        })
    }
}
