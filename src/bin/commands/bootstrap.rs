use anyhow::{Context, Result};
use clap::Args;
use eggcounter::{InsertedCurrency, Operation, OperationReport, SchemaMode};
use tabled::settings::Style;
use tabled::{Table, Tabled};

use super::print_report;

/// Arguments for the Bootstrap command
#[derive(Args)]
pub struct BootstrapArgs {
    /// Abort on the first failing schema statement (overrides schemaMode)
    #[clap(long, conflicts_with = "lenient")]
    pub strict: bool,

    /// Log and skip failing schema statements (overrides schemaMode)
    #[clap(long)]
    pub lenient: bool,

    /// Output the report as JSON
    #[clap(long)]
    pub json: bool,
}

impl BootstrapArgs {
    fn schema_mode(&self) -> Option<SchemaMode> {
        match (self.strict, self.lenient) {
            (true, _) => Some(SchemaMode::Strict),
            (_, true) => Some(SchemaMode::Lenient),
            _ => None,
        }
    }
}

#[derive(Tabled)]
struct CurrencyRow {
    #[tabled(rename = "Numeric")]
    numeric_code: i64,
    #[tabled(rename = "Code")]
    code: String,
    #[tabled(rename = "Currency")]
    name: String,
}

impl From<&InsertedCurrency> for CurrencyRow {
    fn from(c: &InsertedCurrency) -> Self {
        CurrencyRow {
            numeric_code: c.numeric_code,
            code: c.code.clone(),
            name: c.name.clone(),
        }
    }
}

pub fn run(config_path: &str, args: BootstrapArgs) -> Result<()> {
    let report = eggcounter::run(config_path, Operation::Bootstrap, args.schema_mode())
        .context("bootstrap failed, all changes rolled back")?;

    print_report(&report, args.json)?;

    if let (false, OperationReport::Bootstrap(bootstrap)) = (args.json, &report) {
        let inserted = &bootstrap.reconcile.currencies_inserted;
        if !inserted.is_empty() {
            let rows: Vec<CurrencyRow> = inserted.iter().map(CurrencyRow::from).collect();
            println!("{}", Table::new(rows).with(Style::rounded()));
        }
    }
    Ok(())
}
