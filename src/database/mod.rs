//! Database module
//!
//! This module provides all database functionality for eggcounter, organized into:
//!
//! - **core**: the `Connection` capability, the SQLite driver, and schema handling
//! - **registry**: the currency/entity tables and their reconciliation
//!
//! # Architecture
//!
//! ```text
//! database/
//! ├── core/            # Foundation
//! │   ├── connection   # Connection trait, SQLite DatabaseConn, driver resolution
//! │   └── schema       # schema splitting, execution, and teardown planning
//! │
//! └── registry/        # Currency registry
//!     ├── snapshot     # persisted currency → entities state
//!     └── reconcile    # two-pass import of the reference dataset
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use eggcounter::database::{CurrencyRegistry, DatabaseConn, SchemaExecutor, SchemaSource};
//! use eggcounter::datasets::ReferenceCurrencyLoader;
//!
//! let mut db = DatabaseConn::open_path("eggcounter.sqlite3")?;
//! SchemaExecutor::new(SchemaMode::Strict).execute(&mut db, &SchemaSource::from_path("sql/schema.sql")?)?;
//!
//! let records = ReferenceCurrencyLoader::load("data/iso-4217-currency.json")?;
//! let report = CurrencyRegistry::new(&mut db).reconcile(records)?;
//! db.commit()?;
//! ```

pub mod core;
pub mod registry;

pub use core::{
    resolve_driver, Connection, Connector, DatabaseConn, SchemaExecutor, SchemaReport,
    SchemaSource, SqliteConnector, StatementFailure, TeardownPlan, TeardownPlanner,
    SQLITE_DRIVER_NAMES,
};

pub use registry::{
    CurrencyRegistry, EntityAssociation, InsertedCurrency, PersistedStateReader, ReconcileReport,
    ReconciliationEngine, ReconciliationSnapshot, RegistryStatus, DEFAULT_SCHEMA,
};
