#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

//! Eggcounter - ISO 4217 currency registry bootstrapper
//!
//! Eggcounter prepares a relational database for a currency registry: it applies
//! a schema, then reconciles the `currency` and `entity` tables against the ISO
//! 4217 reference list. Every run happens inside one transaction that is
//! committed only when the whole command succeeds. It can be used as both a
//! command-line application and a library.
//!
//! # Architecture
//!
//! - **[`config`]**: Configuration loading and validation
//! - **[`database`]**: Database access
//!   - `core`: the [`Connection`] capability, the SQLite driver, schema execution
//!     and teardown
//!   - `registry`: currency/entity reconciliation
//! - **[`datasets`]**: The ISO 4217 reference dataset
//! - **[`command`]**: The transactional command lifecycle tying everything together
//! - **[`error`]**: The shared [`EggError`] type
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use eggcounter::{run, Operation};
//!
//! // load ./etc/eggcounter.json, apply the schema, reconcile currencies, commit
//! let report = eggcounter::run("./etc/eggcounter.json", Operation::Bootstrap, None)?;
//! println!("{}", report.summary());
//! ```
//!
//! Driving the lifecycle step by step:
//!
//! ```rust,ignore
//! use eggcounter::{EggcounterConfig, Operation, SqliteConnector, TransactionalCommand};
//!
//! let mut command = TransactionalCommand::new(Operation::Teardown);
//! command.configure(EggcounterConfig::load("./etc/eggcounter.json")?)?;
//! command.connect(SqliteConnector)?;
//! let report = command.execute()?;
//! ```

pub mod command;
pub mod config;
pub mod database;
pub mod datasets;
pub mod error;

pub use command::{
    run, BootstrapReport, CommandState, Operation, OperationReport, RunContext,
    TransactionalCommand,
};
pub use config::{DbConnectionConfig, EggcounterConfig, SchemaMode, DEFAULT_CONFIG_PATH};
pub use database::{
    resolve_driver, Connection, Connector, CurrencyRegistry, DatabaseConn, EntityAssociation,
    InsertedCurrency, ReconcileReport, RegistryStatus, SchemaExecutor, SchemaReport, SchemaSource,
    SqliteConnector, TeardownPlan, TeardownPlanner,
};
pub use datasets::{CurrencyRecord, ReferenceCurrencyLoader};
pub use error::{EggError, Result};
