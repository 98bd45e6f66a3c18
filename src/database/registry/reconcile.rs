//! Reconciliation of the reference dataset against the persisted registry
//!
//! The engine makes two passes:
//!
//! 1. Walk the reference records in order. Withdrawn records are dropped. For an
//!    active record whose currency code is not yet known, the currency row is
//!    inserted immediately and the code becomes known, so repeated records for the
//!    same currency never cause a second insert. Every (currency, entity) pair is
//!    remembered in discovery order.
//! 2. Walk the discovered pairs in that same order. Pairs already known are
//!    skipped. Otherwise the entity is inserted only if its name does not exist
//!    under any currency yet, which makes the first discovered association win.
//!
//! Any insert failure rolls back the whole transaction before the error is
//! returned. The engine never commits; that is the caller's decision.

use crate::database::core::Connection;
use crate::database::registry::snapshot::ReconciliationSnapshot;
use crate::datasets::CurrencyRecord;
use crate::error::{EggError, Result};
use rusqlite::types::Value;
use serde::Serialize;
use std::collections::HashSet;
use tracing::{debug, error, info, warn};

const INSERT_CURRENCY: &str = "INSERT INTO currency (id, code, name) VALUES (?1, ?2, ?3)";
const INSERT_ENTITY: &str = "INSERT INTO entity (name, currency_code) VALUES (?1, ?2)";
const ENTITY_EXISTS: &str = "SELECT 1 FROM entity WHERE name = ?1 LIMIT 1";

/// A currency row written by the reconciliation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InsertedCurrency {
    pub numeric_code: i64,
    pub code: String,
    pub name: String,
}

/// An entity row written by the reconciliation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntityAssociation {
    pub entity: String,
    pub code: String,
}

/// What a reconciliation run did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub records_seen: usize,
    pub withdrawn_skipped: usize,
    /// Active records that carry no alphabetic code, or that would need a new
    /// currency row but carry no numeric code
    pub uncoded_skipped: usize,
    /// Pairs dropped because the entity already uses another currency
    pub entities_already_assigned: usize,
    pub currencies_inserted: Vec<InsertedCurrency>,
    pub entities_inserted: Vec<EntityAssociation>,
}

impl ReconcileReport {
    pub fn summary(&self) -> String {
        format!(
            "{} records: {} currencies inserted, {} entities inserted, {} withdrawn, {} without code, {} entities already assigned",
            self.records_seen,
            self.currencies_inserted.len(),
            self.entities_inserted.len(),
            self.withdrawn_skipped,
            self.uncoded_skipped,
            self.entities_already_assigned,
        )
    }
}

/// Computes and applies the inserts needed to bring the registry in line with
/// the reference dataset
pub struct ReconciliationEngine<'a, C: Connection + ?Sized> {
    conn: &'a mut C,
    known: ReconciliationSnapshot,
    report: ReconcileReport,
}

impl<'a, C: Connection + ?Sized> ReconciliationEngine<'a, C> {
    /// Start from the persisted snapshot read before any insert
    pub fn new(conn: &'a mut C, snapshot: ReconciliationSnapshot) -> Self {
        Self {
            conn,
            known: snapshot,
            report: ReconcileReport::default(),
        }
    }

    /// Run both passes over `records`
    pub fn run<I>(mut self, records: I) -> Result<ReconcileReport>
    where
        I: IntoIterator<Item = Result<CurrencyRecord>>,
    {
        info!("importing currencies");

        let discovered = self.resolve_currencies(records)?;
        self.associate_entities(discovered)?;

        info!("{}", self.report.summary());
        Ok(self.report)
    }

    /// First pass: insert unknown currencies, collect (code, entity) pairs
    fn resolve_currencies<I>(&mut self, records: I) -> Result<Vec<(String, String)>>
    where
        I: IntoIterator<Item = Result<CurrencyRecord>>,
    {
        let mut discovered: Vec<(String, String)> = Vec::new();
        let mut seen: HashSet<(String, String)> = HashSet::new();

        for record in records {
            let record = record?;
            self.report.records_seen += 1;

            if record.is_withdrawn() {
                self.report.withdrawn_skipped += 1;
                continue;
            }

            let Some(code) = record.alphabetic_code.clone() else {
                debug!("no currency code for '{}', skipping", record.entity);
                self.report.uncoded_skipped += 1;
                continue;
            };

            if !self.known.contains_currency(&code) {
                let Some(numeric_code) = record.numeric_code else {
                    warn!(
                        "currency {} ({}) has no numeric code and cannot be inserted",
                        code, record.currency
                    );
                    self.report.uncoded_skipped += 1;
                    continue;
                };
                self.insert_currency(numeric_code, &code, &record)?;
            }

            let pair = (code, record.normalized_entity());
            if seen.insert(pair.clone()) {
                discovered.push(pair);
            }
        }

        Ok(discovered)
    }

    /// Second pass: insert entities not yet tied to any currency
    fn associate_entities(&mut self, discovered: Vec<(String, String)>) -> Result<()> {
        for (code, entity) in discovered {
            if self.known.has_entity(&code, &entity) {
                continue;
            }

            if self.entity_exists(&entity)? {
                debug!("entity '{}' already has a currency, not linking to {}", entity, code);
                self.report.entities_already_assigned += 1;
                continue;
            }

            self.insert_entity(&entity, &code)?;
        }
        Ok(())
    }

    fn insert_currency(
        &mut self,
        numeric_code: i64,
        code: &str,
        record: &CurrencyRecord,
    ) -> Result<()> {
        debug!("inserting currency {} {} {}", numeric_code, code, record.currency);
        let params = [
            Value::Integer(numeric_code),
            Value::Text(code.to_string()),
            Value::Text(record.currency.clone()),
        ];

        if let Err(e) = self.conn.execute(INSERT_CURRENCY, &params) {
            error!("failed to insert currency {:?}: {}", record, e);
            return Err(self.abort(EggError::statement(INSERT_CURRENCY, e)));
        }

        self.known.mark_currency(code);
        self.report.currencies_inserted.push(InsertedCurrency {
            numeric_code,
            code: code.to_string(),
            name: record.currency.clone(),
        });
        Ok(())
    }

    fn insert_entity(&mut self, entity: &str, code: &str) -> Result<()> {
        debug!("inserting entity '{}' -> {}", entity, code);
        let params = [Value::Text(entity.to_string()), Value::Text(code.to_string())];

        if let Err(e) = self.conn.execute(INSERT_ENTITY, &params) {
            error!("failed to insert entity '{}' for {}: {}", entity, code, e);
            return Err(self.abort(EggError::statement(INSERT_ENTITY, e)));
        }

        self.known.add_entity(code, entity);
        self.report.entities_inserted.push(EntityAssociation {
            entity: entity.to_string(),
            code: code.to_string(),
        });
        Ok(())
    }

    fn entity_exists(&mut self, entity: &str) -> Result<bool> {
        let rows = self
            .conn
            .query(ENTITY_EXISTS, &[Value::Text(entity.to_string())])?;
        Ok(!rows.is_empty())
    }

    /// Roll back the run and hand back the error that caused it
    fn abort(&mut self, err: EggError) -> EggError {
        if let Err(rollback_err) = self.conn.rollback() {
            error!("rollback failed: {}", rollback_err);
        }
        err
    }
}
