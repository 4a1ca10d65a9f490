use std::{fs, path::PathBuf};

use clap::Args;
use serde::Deserialize;

use coupons::prelude::*;
use coupons_app::{catalogue::YamlCatalogue, config::ServiceConfig};

#[derive(Debug, Args)]
pub(crate) struct SettleArgs {
    /// Template catalogue (YAML)
    #[arg(long, env = "COUPON_CATALOGUE")]
    catalogue: PathBuf,

    /// Settlement request (YAML)
    #[arg(long)]
    request: PathBuf,

    #[command(flatten)]
    service: ServiceConfig,
}

/// Settlement request as written in a request file.
#[derive(Debug, Deserialize)]
struct RequestFile {
    user_id: u64,
    goods: Vec<GoodsLine>,
    #[serde(default)]
    chosen: Vec<ChosenLine>,
}

#[derive(Debug, Deserialize)]
struct GoodsLine {
    /// `AMOUNT CURRENCY`, e.g. `10.88 CNY`
    price: String,
    count: u32,
    goods_type: String,
}

#[derive(Debug, Deserialize)]
struct ChosenLine {
    coupon_id: u64,
    template_id: u32,
}

pub(crate) fn run(args: SettleArgs) -> Result<(), String> {
    let catalogue = YamlCatalogue::from_path(&args.catalogue)
        .map_err(|error| format!("failed to load catalogue: {error}"))?;

    let yaml = fs::read_to_string(&args.request)
        .map_err(|error| format!("failed to read request: {error}"))?;

    let file: RequestFile = serde_norway::from_str(&yaml)
        .map_err(|error| format!("failed to parse request: {error}"))?;

    let settings = args
        .service
        .settings()
        .map_err(|error| format!("invalid settlement settings: {error}"))?;

    let request = build_request(file, &catalogue)?;

    let engine = SettlementEngine::new(SettlementConfig {
        currency: settings.currency,
        min_cost_minor: settings.min_cost_minor,
    });

    let settled = engine
        .settle(request)
        .map_err(|error| format!("settlement failed: {error}"))?;

    if let Some(cost) = settled.cost {
        println!("cost: {cost}");
    }

    if settled.chosen.is_empty() {
        println!("applied: none");
    }

    for coupon in &settled.chosen {
        println!(
            "applied: coupon {} ({}, template {})",
            coupon.coupon_id, coupon.template.name, coupon.template.id
        );
    }

    Ok(())
}

fn build_request(
    file: RequestFile,
    catalogue: &YamlCatalogue,
) -> Result<SettlementRequest<'static>, String> {
    let goods = file
        .goods
        .iter()
        .map(|line| -> Result<GoodsItem<'static>, String> {
            let price = parse_price(&line.price)
                .map_err(|error| format!("invalid goods price: {error}"))?;

            Ok(GoodsItem::new(price, line.count, &line.goods_type))
        })
        .collect::<Result<Vec<_>, String>>()?;

    let chosen = file
        .chosen
        .iter()
        .map(|line| -> Result<ChosenCoupon, String> {
            let template = catalogue
                .get(TemplateId(line.template_id))
                .map_err(|error| error.to_string())?;

            Ok(ChosenCoupon {
                coupon_id: CouponId(line.coupon_id),
                template: template.clone(),
            })
        })
        .collect::<Result<Vec<_>, String>>()?;

    Ok(SettlementRequest::new(UserId(file.user_id), goods, chosen))
}
