//! Core database infrastructure
//!
//! - `Connection`: the SQL capability the import pipeline is written against
//! - `DatabaseConn`: SQLite implementation of that capability
//! - `SchemaSource` / `SchemaExecutor` / `TeardownPlanner`: applying and
//!   tearing down the schema text

mod connection;
mod schema;

pub use connection::{
    resolve_driver, Connection, Connector, DatabaseConn, SqliteConnector, SQLITE_DRIVER_NAMES,
};
pub use schema::{
    SchemaExecutor, SchemaReport, SchemaSource, StatementFailure, TeardownPlan, TeardownPlanner,
};
