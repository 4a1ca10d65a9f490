use std::{path::PathBuf, sync::Arc};

use clap::Args;

use coupons::templates::TemplateId;
use coupons_app::{
    cache::RedisCacheStore, catalogue::YamlCatalogue, codes::CodePool, config::CacheConfig,
};

#[derive(Debug, Args)]
pub(crate) struct StockArgs {
    /// Template catalogue (YAML)
    #[arg(long, env = "COUPON_CATALOGUE")]
    catalogue: PathBuf,

    /// Template to stock
    #[arg(long)]
    template: u32,

    #[command(flatten)]
    cache: CacheConfig,
}

pub(crate) async fn run(args: StockArgs) -> Result<(), String> {
    let catalogue = YamlCatalogue::from_path(&args.catalogue)
        .map_err(|error| format!("failed to load catalogue: {error}"))?;

    let mut template = catalogue
        .get(TemplateId(args.template))
        .map_err(|error| error.to_string())?
        .clone();

    let store = RedisCacheStore::connect(&args.cache.redis_url)
        .await
        .map_err(|error| format!("failed to connect to cache: {error}"))?;

    let pool = CodePool::new(Arc::new(store))
        .stock(&mut template)
        .await
        .map_err(|error| format!("failed to stock codes: {error}"))?;

    println!("template {} stocked, {pool} codes in pool", template.id);
    println!("available: {}", template.available);

    Ok(())
}
