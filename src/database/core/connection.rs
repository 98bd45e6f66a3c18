//! Database connection management
//!
//! The import pipeline talks to the database only through the [`Connection`]
//! capability: run a statement, run a query, commit, roll back. Which driver
//! provides that capability is decided once, by [`resolve_driver`], from the
//! driver name in the configuration.

use crate::config::DbConnectionConfig;
use crate::error::{EggError, Result};
use rusqlite::types::Value;
use tracing::{debug, info};

/// SQL execution and transaction control, as seen by the import pipeline
///
/// Transactions follow the DB-API model: the first statement after a commit or
/// rollback implicitly opens a transaction, and `commit`/`rollback` do nothing
/// when no transaction is open.
pub trait Connection {
    /// Execute a single statement, returning the number of affected rows
    fn execute(&mut self, sql: &str, params: &[Value]) -> Result<usize>;

    /// Run a query and collect every row
    fn query(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Vec<Value>>>;

    fn commit(&mut self) -> Result<()>;

    fn rollback(&mut self) -> Result<()>;

    /// Whether one `DROP TABLE` statement may name several tables
    fn supports_multi_table_drop(&self) -> bool {
        true
    }
}

/// SQLite connection wrapper
///
/// `DatabaseConn` wraps a rusqlite connection, handling both file-based and
/// in-memory databases with consistent configuration and error handling.
pub struct DatabaseConn {
    pub conn: rusqlite::Connection,
}

impl DatabaseConn {
    /// Open a database at the specified path
    ///
    /// If the path is `None`, an in-memory database is created.
    pub fn open(path: Option<&str>) -> Result<Self> {
        let conn = match path {
            Some(p) => rusqlite::Connection::open(p).map_err(|e| {
                EggError::Connection(format!("failed to open database at '{}': {}", p, e))
            })?,
            None => rusqlite::Connection::open_in_memory().map_err(|e| {
                EggError::Connection(format!("failed to create in-memory database: {}", e))
            })?,
        };

        let db = DatabaseConn { conn };
        db.configure()?;
        Ok(db)
    }

    /// Open a database at the specified path (convenience method)
    pub fn open_path(path: &str) -> Result<Self> {
        Self::open(Some(path))
    }

    /// Create an in-memory database
    pub fn open_in_memory() -> Result<Self> {
        Self::open(None)
    }

    fn configure(&self) -> Result<()> {
        // WAL for file databases; in-memory databases report "memory"
        let _: String = self
            .conn
            .query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))
            .map_err(|e| EggError::Connection(format!("failed to set journal mode: {}", e)))?;

        self.conn
            .execute_batch(
                "PRAGMA synchronous=NORMAL;
                 PRAGMA temp_store=MEMORY;
                 PRAGMA foreign_keys=ON;",
            )
            .map_err(|e| EggError::Connection(format!("failed to configure database: {}", e)))?;

        Ok(())
    }

    /// Open a transaction unless one is already in progress
    fn ensure_transaction(&self) -> Result<()> {
        if self.conn.is_autocommit() {
            self.conn.execute_batch("BEGIN")?;
        }
        Ok(())
    }

    /// Whether a transaction is currently open
    pub fn in_transaction(&self) -> bool {
        !self.conn.is_autocommit()
    }

    /// Check if a table exists in the database
    pub fn table_exists(&self, table_name: &str) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
            [table_name],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Get the row count for a table
    pub fn table_count(&self, table_name: &str) -> Result<u64> {
        let query = format!("SELECT COUNT(*) FROM {}", table_name);
        let count: u64 = self.conn.query_row(&query, [], |row| row.get(0))?;
        Ok(count)
    }
}

impl Connection for DatabaseConn {
    fn execute(&mut self, sql: &str, params: &[Value]) -> Result<usize> {
        self.ensure_transaction()?;
        let mut stmt = self.conn.prepare(sql)?;
        if stmt.column_count() == 0 {
            return Ok(stmt.execute(rusqlite::params_from_iter(params.iter()))?);
        }

        // PRAGMA, SELECT and the like: run to completion and discard the rows
        let mut rows = stmt.query(rusqlite::params_from_iter(params.iter()))?;
        while rows.next()?.is_some() {}
        Ok(0)
    }

    fn query(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Vec<Value>>> {
        self.ensure_transaction()?;
        let mut stmt = self.conn.prepare(sql)?;
        let width = stmt.column_count();
        let rows = stmt.query_map(rusqlite::params_from_iter(params.iter()), |row| {
            (0..width)
                .map(|i| row.get::<_, Value>(i))
                .collect::<rusqlite::Result<Vec<Value>>>()
        })?;

        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(EggError::from)
    }

    fn commit(&mut self) -> Result<()> {
        if self.in_transaction() {
            self.conn.execute_batch("COMMIT")?;
        }
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        if self.in_transaction() {
            self.conn.execute_batch("ROLLBACK")?;
        }
        Ok(())
    }

    fn supports_multi_table_drop(&self) -> bool {
        false
    }
}

/// Something that can open a [`Connection`] from connection settings
pub trait Connector {
    type Conn: Connection;

    fn connect(&self, settings: &DbConnectionConfig) -> Result<Self::Conn>;
}

/// Connector for the bundled SQLite driver
///
/// Parameters: `path` (aliases `database`, `dbname`). Without a path, or with
/// `:memory:`, an in-memory database is opened.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteConnector;

impl Connector for SqliteConnector {
    type Conn = DatabaseConn;

    fn connect(&self, settings: &DbConnectionConfig) -> Result<DatabaseConn> {
        match settings.param(&["path", "database", "dbname"]) {
            None | Some(":memory:") => DatabaseConn::open_in_memory(),
            Some(path) => DatabaseConn::open_path(path),
        }
    }
}

/// Driver names accepted for the bundled SQLite driver
pub const SQLITE_DRIVER_NAMES: &[&str] = &["sqlite", "sqlite3", "rusqlite"];

/// Resolve a driver name from the configuration into a connector
pub fn resolve_driver(name: &str) -> Result<SqliteConnector> {
    info!("loading the driver '{}'", name);
    if SQLITE_DRIVER_NAMES.contains(&name.to_lowercase().as_str()) {
        debug!("driver '{}' resolved to bundled SQLite", name);
        Ok(SqliteConnector)
    } else {
        Err(EggError::DriverLoad(name.to_string()))
    }
}
