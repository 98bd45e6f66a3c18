use anyhow::{Context, Result};
use clap::Args;
use eggcounter::Operation;

use super::print_report;

/// Arguments for the Teardown command
#[derive(Args)]
pub struct TeardownArgs {
    /// Output the report as JSON
    #[clap(long)]
    pub json: bool,
}

pub fn run(config_path: &str, args: TeardownArgs) -> Result<()> {
    let report = eggcounter::run(config_path, Operation::Teardown, None)
        .context("teardown failed, all changes rolled back")?;
    print_report(&report, args.json)
}
