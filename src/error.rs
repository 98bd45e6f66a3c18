//! Error types shared across eggcounter
//!
//! Configuration and connection failures are always fatal for a run. Statement
//! failures may be tolerated by the schema executor in lenient mode; everything
//! else aborts the run and rolls back the open transaction.

use thiserror::Error;

/// Library-wide error type
#[derive(Debug, Error)]
pub enum EggError {
    /// The configuration file is missing, malformed, or fails validation
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The named database driver cannot be resolved
    #[error("unable to load database driver '{0}'")]
    DriverLoad(String),

    /// The driver refused the connection
    #[error("connection error: {0}")]
    Connection(String),

    /// A reference dataset record is missing required fields or carries bad values
    #[error("data format error: {0}")]
    DataFormat(String),

    /// A single SQL statement failed
    #[error("statement failed: {message}\n  statement: {statement}")]
    StatementExecution { statement: String, message: String },

    /// Low-level database failure outside of a tracked statement
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl EggError {
    /// Wrap a database failure with the statement text that produced it
    pub fn statement(statement: &str, err: impl std::fmt::Display) -> Self {
        EggError::StatementExecution {
            statement: statement.to_string(),
            message: err.to_string(),
        }
    }

    /// Short name of the error kind, used in log lines and JSON output
    pub fn kind(&self) -> &'static str {
        match self {
            EggError::Configuration(_) => "ConfigurationError",
            EggError::DriverLoad(_) => "DriverLoadError",
            EggError::Connection(_) => "ConnectionError",
            EggError::DataFormat(_) => "DataFormatError",
            EggError::StatementExecution { .. } => "StatementExecutionError",
            EggError::Database(_) => "DatabaseError",
            EggError::Io(_) => "IoError",
        }
    }
}

/// Convenience alias for results returned by eggcounter
pub type Result<T> = std::result::Result<T, EggError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statement_error_display() {
        let err = EggError::statement("CREATE TABL x", "near \"TABL\": syntax error");
        assert_eq!(err.kind(), "StatementExecutionError");
        let msg = err.to_string();
        assert!(msg.contains("syntax error"));
        assert!(msg.contains("CREATE TABL x"));
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(
            EggError::Configuration("x".into()).kind(),
            "ConfigurationError"
        );
        assert_eq!(EggError::DriverLoad("x".into()).kind(), "DriverLoadError");
        assert_eq!(EggError::Connection("x".into()).kind(), "ConnectionError");
        assert_eq!(EggError::DataFormat("x".into()).kind(), "DataFormatError");
    }
}
