use clap::{Parser, Subcommand};
use eggcounter::DEFAULT_CONFIG_PATH;
use tracing_subscriber::EnvFilter;

mod commands;

use commands::bootstrap::BootstrapArgs;
use commands::config::ConfigArgs;
use commands::status::StatusArgs;
use commands::teardown::TeardownArgs;

#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
#[clap(propagate_version = true)]
struct Cli {
    /// configuration file path
    #[clap(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: String,

    /// Print debug information
    #[clap(long)]
    debug: bool,

    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply the schema and reconcile currencies against the ISO 4217 list
    Bootstrap(BootstrapArgs),

    /// Drop every table declared in the schema
    Teardown(TeardownArgs),

    /// Show currency registry row counts
    Status(StatusArgs),

    /// Show the effective configuration, after environment overrides
    Config(ConfigArgs),
}

fn main() {
    let cli = Cli::parse();

    let level = if cli.debug { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(level))
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Bootstrap(args) => commands::bootstrap::run(&cli.config, args),
        Commands::Teardown(args) => commands::teardown::run(&cli.config, args),
        Commands::Status(args) => commands::status::run(&cli.config, args),
        Commands::Config(args) => commands::config::run(&cli.config, args),
    };

    if let Err(e) = result {
        eprintln!("ERROR: {:#}", e);
        std::process::exit(1);
    }
}
