use clap::{Parser, Subcommand};

use coupons_app::config::LoggingConfig;

mod acquire;
mod list;
mod migrate;
mod settle;
mod stock;
mod sweep;

#[derive(Debug, Parser)]
#[command(name = "coupons-app", about = "Coupon issuance and settlement", long_about = None)]
pub(crate) struct Cli {
    /// Logging output settings.
    #[command(flatten)]
    pub(crate) logging: LoggingConfig,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Price a cart against chosen coupons
    Settle(settle::SettleArgs),

    /// List templates whose deadline has passed
    SweepTemplates(sweep::SweepArgs),

    /// Generate a template's redemption codes into its pool
    StockCodes(stock::StockArgs),

    /// List a user's coupons in one status
    Coupons(list::CouponsArgs),

    /// Give a user a coupon of a template
    Acquire(acquire::AcquireArgs),

    /// Apply database migrations
    Migrate(migrate::MigrateArgs),
}

impl Cli {
    /// Load arguments, reading `.env` first if present.
    pub(crate) fn load() -> Result<Self, clap::Error> {
        _ = dotenvy::dotenv();

        Self::try_parse()
    }

    pub(crate) async fn run(self) -> Result<(), String> {
        match self.command {
            Commands::Settle(args) => settle::run(args),
            Commands::SweepTemplates(args) => sweep::run(args),
            Commands::StockCodes(args) => stock::run(args).await,
            Commands::Coupons(args) => list::run(args).await,
            Commands::Acquire(args) => acquire::run(args).await,
            Commands::Migrate(args) => migrate::run(args).await,
        }
    }
}
