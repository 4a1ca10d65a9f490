use std::path::PathBuf;

use clap::Args;
use jiff::Timestamp;

use coupons::{coupons::UserId, templates::TemplateId};
use coupons_app::{
    catalogue::YamlCatalogue,
    config::{CacheConfig, DatabaseConfig, ServiceConfig},
    context::AppContext,
};

#[derive(Debug, Args)]
pub(crate) struct AcquireArgs {
    /// User receiving the coupon
    #[arg(long)]
    user: u64,

    /// Template to acquire
    #[arg(long)]
    template: u32,

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

pub(crate) async fn run(args: AcquireArgs) -> Result<(), String> {
    let catalogue = YamlCatalogue::from_path(&args.catalogue)
        .map_err(|error| format!("failed to load catalogue: {error}"))?;

    let app = AppContext::connect(&args.cache, &args.database, &args.service, catalogue)
        .await
        .map_err(|error| format!("failed to initialise app: {error}"))?;

    let result = app
        .service
        .acquire_template(UserId(args.user), TemplateId(args.template), Timestamp::now())
        .await;

    app.shutdown().await;

    let coupon = result.map_err(|error| format!("failed to acquire coupon: {error}"))?;

    println!("coupon_id: {}", coupon.id);
    println!("code: {}", coupon.code);

    Ok(())
}
