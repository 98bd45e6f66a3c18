//! Currency registry storage
//!
//! The registry consists of two tables created by the bootstrap schema:
//! - `currency`: ISO 4217 currencies keyed by numeric code, unique by alphabetic code
//! - `entity`: countries and other entities, each tied to one currency code
//!
//! Rows are only ever added by reconciliation against the reference dataset;
//! nothing here updates or deletes them.

mod reconcile;
mod snapshot;

pub use reconcile::{EntityAssociation, InsertedCurrency, ReconcileReport, ReconciliationEngine};
pub use snapshot::{PersistedStateReader, ReconciliationSnapshot};

use crate::database::core::Connection;
use crate::datasets::CurrencyRecord;
use crate::error::Result;
use rusqlite::types::Value;
use serde::Serialize;

/// Schema shipped with eggcounter, used when no schema file is configured
pub const DEFAULT_SCHEMA: &str = include_str!("../../../sql/schema.sql");

/// Row counts of the registry tables; `None` when the table does not exist
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RegistryStatus {
    pub currency_count: Option<u64>,
    pub entity_count: Option<u64>,
}

impl RegistryStatus {
    pub fn is_initialized(&self) -> bool {
        self.currency_count.is_some() && self.entity_count.is_some()
    }
}

/// Data access for the currency registry
pub struct CurrencyRegistry<'a, C: Connection + ?Sized> {
    conn: &'a mut C,
}

impl<'a, C: Connection + ?Sized> CurrencyRegistry<'a, C> {
    pub fn new(conn: &'a mut C) -> Self {
        Self { conn }
    }

    /// Read the persisted currency → entities snapshot
    pub fn snapshot(&mut self) -> Result<ReconciliationSnapshot> {
        PersistedStateReader::read(&mut *self.conn)
    }

    /// Bring the registry in line with `records`
    ///
    /// The snapshot is taken once, before the first insert.
    pub fn reconcile<I>(&mut self, records: I) -> Result<ReconcileReport>
    where
        I: IntoIterator<Item = Result<CurrencyRecord>>,
    {
        let snapshot = self.snapshot()?;
        ReconciliationEngine::new(&mut *self.conn, snapshot).run(records)
    }

    /// Currency code an entity is tied to
    pub fn currency_of(&mut self, entity: &str) -> Result<Option<String>> {
        let rows = self.conn.query(
            "SELECT currency_code FROM entity WHERE name = ?1",
            &[Value::Text(entity.to_lowercase())],
        )?;
        Ok(rows
            .into_iter()
            .next()
            .and_then(|row| row.into_iter().next())
            .and_then(|v| match v {
                Value::Text(code) => Some(code),
                _ => None,
            }))
    }

    pub fn currency_count(&mut self) -> Result<u64> {
        self.count("currency")
    }

    pub fn entity_count(&mut self) -> Result<u64> {
        self.count("entity")
    }

    /// Table counts, treating a failing count as a missing table
    pub fn status(&mut self) -> RegistryStatus {
        RegistryStatus {
            currency_count: self.currency_count().ok(),
            entity_count: self.entity_count().ok(),
        }
    }

    fn count(&mut self, table: &str) -> Result<u64> {
        let rows = self
            .conn
            .query(&format!("SELECT COUNT(*) FROM {}", table), &[])?;
        let count = match rows.first().and_then(|row| row.first()) {
            Some(Value::Integer(n)) => *n as u64,
            _ => 0,
        };
        Ok(count)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::SchemaMode;
    use crate::database::core::{DatabaseConn, SchemaExecutor, SchemaSource};
    use crate::datasets::ReferenceCurrencyLoader;

    /// In-memory database with the default schema applied and committed
    pub(crate) fn setup_test_db() -> DatabaseConn {
        let mut db = DatabaseConn::open_in_memory().unwrap();
        SchemaExecutor::new(SchemaMode::Strict)
            .execute(&mut db, &SchemaSource::parse(DEFAULT_SCHEMA))
            .unwrap();
        db.commit().unwrap();
        db
    }

    #[test]
    fn test_default_schema_applies() {
        let db = setup_test_db();
        assert!(db.table_exists("currency").unwrap());
        assert!(db.table_exists("entity").unwrap());
    }

    #[test]
    fn test_status() {
        let mut db = DatabaseConn::open_in_memory().unwrap();
        let status = CurrencyRegistry::new(&mut db).status();
        assert!(!status.is_initialized());
        db.rollback().unwrap();

        let mut db = setup_test_db();
        let status = CurrencyRegistry::new(&mut db).status();
        assert_eq!(
            status,
            RegistryStatus {
                currency_count: Some(0),
                entity_count: Some(0),
            }
        );
    }

    #[test]
    fn test_reconcile_from_dataset() {
        let mut db = setup_test_db();
        let records = ReferenceCurrencyLoader::from_json_str(
            r#"[
              {"Entity": "FRANCE", "Currency": "Euro", "Alphabetic_Code": "EUR",
               "Numeric_Code": 978, "Withdrawal_Date": null, "Withdrawal_Interval": null},
              {"Entity": "FRANCE", "Currency": "French Franc", "Alphabetic_Code": "FRF",
               "Numeric_Code": 250, "Withdrawal_Date": "2002-03", "Withdrawal_Interval": null},
              {"Entity": "GERMANY", "Currency": "Euro", "Alphabetic_Code": "EUR",
               "Numeric_Code": 978, "Withdrawal_Date": null, "Withdrawal_Interval": null},
              {"Entity": "ANTARCTICA", "Currency": "No universal currency",
               "Alphabetic_Code": null, "Numeric_Code": null,
               "Withdrawal_Date": null, "Withdrawal_Interval": null}
            ]"#,
        )
        .unwrap();

        let mut registry = CurrencyRegistry::new(&mut db);
        let report = registry.reconcile(records).unwrap();

        assert_eq!(report.records_seen, 4);
        assert_eq!(report.withdrawn_skipped, 1);
        assert_eq!(report.uncoded_skipped, 1);
        assert_eq!(registry.currency_count().unwrap(), 1);
        assert_eq!(registry.entity_count().unwrap(), 2);
        assert_eq!(
            registry.currency_of("Germany").unwrap(),
            Some("EUR".to_string())
        );
        assert_eq!(registry.currency_of("antarctica").unwrap(), None);
    }
}
