use anyhow::{Context, Result};
use clap::Args;
use eggcounter::{Operation, OperationReport, RegistryStatus};
use tabled::settings::Style;
use tabled::{Table, Tabled};

/// Arguments for the Status command
#[derive(Args)]
pub struct StatusArgs {
    /// Output as JSON
    #[clap(long)]
    pub json: bool,
}

#[derive(Tabled)]
struct TableRow {
    #[tabled(rename = "Table")]
    table: &'static str,
    #[tabled(rename = "Exists")]
    exists: bool,
    #[tabled(rename = "Rows")]
    rows: String,
}

fn table_rows(status: &RegistryStatus) -> Vec<TableRow> {
    [
        ("currency", status.currency_count),
        ("entity", status.entity_count),
    ]
    .into_iter()
    .map(|(table, count)| TableRow {
        table,
        exists: count.is_some(),
        rows: count.map(|n| n.to_string()).unwrap_or_else(|| "-".to_string()),
    })
    .collect()
}

pub fn run(config_path: &str, args: StatusArgs) -> Result<()> {
    let report = eggcounter::run(config_path, Operation::Status, None)
        .context("unable to read registry status")?;

    let status = match &report {
        OperationReport::Status(status) => status,
        other => anyhow::bail!("unexpected report for status: {:?}", other),
    };

    if args.json {
        let value = serde_json::json!({
            "initialized": status.is_initialized(),
            "currency_count": status.currency_count,
            "entity_count": status.entity_count,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    println!("{}", Table::new(table_rows(status)).with(Style::rounded()));
    if !status.is_initialized() {
        println!("registry not initialized, run `eggcounter bootstrap`");
    }
    Ok(())
}
