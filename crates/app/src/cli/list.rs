use std::path::PathBuf;

use clap::{Args, ValueEnum};
use jiff::Timestamp;

use coupons::coupons::{CouponStatus, UserId};
use coupons_app::{
    catalogue::YamlCatalogue,
    config::{CacheConfig, DatabaseConfig, ServiceConfig},
    context::AppContext,
};

#[derive(Clone, Copy, Debug, ValueEnum)]
pub(crate) enum StatusArg {
    Usable,
    Used,
    Expired,
}

impl From<StatusArg> for CouponStatus {
    fn from(status: StatusArg) -> Self {
        match status {
            StatusArg::Usable => Self::Usable,
            StatusArg::Used => Self::Used,
            StatusArg::Expired => Self::Expired,
        }
    }
}

#[derive(Debug, Args)]
pub(crate) struct CouponsArgs {
    /// User whose coupons to list
    #[arg(long)]
    user: u64,

    /// Status partition to read
    #[arg(long, value_enum, default_value_t = StatusArg::Usable)]
    status: StatusArg,

    /// Template catalogue (YAML)
    #[arg(long, env = "COUPON_CATALOGUE")]
    catalogue: PathBuf,

    #[command(flatten)]
    cache: CacheConfig,

    #[command(flatten)]
    database: DatabaseConfig,

    #[command(flatten)]
    service: ServiceConfig,
}

pub(crate) async fn run(args: CouponsArgs) -> Result<(), String> {
    let catalogue = YamlCatalogue::from_path(&args.catalogue)
        .map_err(|error| format!("failed to load catalogue: {error}"))?;

    let app = AppContext::connect(&args.cache, &args.database, &args.service, catalogue)
        .await
        .map_err(|error| format!("failed to initialise app: {error}"))?;

    let result = app
        .service
        .find_coupons_by_status(UserId(args.user), args.status.into(), Timestamp::now())
        .await;

    app.shutdown().await;

    let coupons = result.map_err(|error| format!("failed to list coupons: {error}"))?;

    if coupons.is_empty() {
        println!("no coupons");
    }

    for coupon in coupons {
        let name = coupon
            .template
            .as_ref()
            .map_or("unknown template", |template| template.name.as_str());

        println!(
            "{} {} {} ({}) assigned {}",
            coupon.id, coupon.code, coupon.status, name, coupon.assigned_at
        );
    }

    Ok(())
}
