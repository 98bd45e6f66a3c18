pub mod bootstrap;
pub mod config;
pub mod status;
pub mod teardown;

use eggcounter::OperationReport;

/// Print a report either as pretty JSON or as its text summary
pub(crate) fn print_report(report: &OperationReport, json: bool) -> Result<(), anyhow::Error> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else {
        println!("{}", report.summary());
    }
    Ok(())
}
