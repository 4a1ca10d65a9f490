use std::path::PathBuf;

use clap::Args;
use jiff::Timestamp;

use coupons_app::catalogue::YamlCatalogue;

#[derive(Debug, Args)]
pub(crate) struct SweepArgs {
    /// Template catalogue (YAML)
    #[arg(long, env = "COUPON_CATALOGUE")]
    catalogue: PathBuf,

    /// Sweep as of this instant instead of now
    #[arg(long)]
    now: Option<Timestamp>,
}

pub(crate) fn run(args: SweepArgs) -> Result<(), String> {
    let catalogue = YamlCatalogue::from_path(&args.catalogue)
        .map_err(|error| format!("failed to load catalogue: {error}"))?;

    let now = args.now.unwrap_or_else(Timestamp::now);
    let due = catalogue.due_for_expiry(now);

    if due.is_empty() {
        println!("no templates due for expiry at {now}");
    }

    for template in due {
        println!(
            "expired: template {} ({}), deadline {}",
            template.id, template.name, template.rule.deadline
        );
    }

    Ok(())
}
