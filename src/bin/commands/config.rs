use anyhow::{Context, Result};
use clap::Args;
use eggcounter::EggcounterConfig;
use serde::Serialize;
use std::collections::BTreeMap;

/// Arguments for the Config command
#[derive(Args)]
pub struct ConfigArgs {
    /// Output as JSON
    #[clap(long)]
    pub json: bool,
}

#[derive(Debug, Serialize)]
struct ConfigInfo<'a> {
    config_file: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    version: Option<f64>,
    driver: &'a str,
    connection: BTreeMap<String, String>,
    schema_path: &'a str,
    currencies_path: &'a str,
    schema_mode: String,
}

pub fn run(config_path: &str, args: ConfigArgs) -> Result<()> {
    let config = EggcounterConfig::load(config_path)
        .with_context(|| format!("unable to load configuration from {}", config_path))?;

    if args.json {
        let info = ConfigInfo {
            config_file: config_path,
            version: config.version,
            driver: &config.db_connection.driver,
            connection: config.db_connection.redacted(),
            schema_path: &config.schema_path,
            currencies_path: &config.currencies_path,
            schema_mode: config.schema_mode.to_string(),
        };
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(());
    }

    println!("Config File:        {}", config_path);
    println!("{}", config.summary());
    Ok(())
}
