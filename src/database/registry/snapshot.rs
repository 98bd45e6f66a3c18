//! Persisted currency/entity state, read once per reconciliation run

use crate::database::core::Connection;
use crate::error::Result;
use rusqlite::types::Value;
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Every persisted currency code with the entities already tied to it, including
/// currencies that have no entity at all
const SNAPSHOT_QUERY: &str = "
    SELECT c.code, e.name
    FROM currency AS c
    LEFT JOIN entity AS e ON e.currency_code = c.code
";

/// Currency code → entity names known for that code
///
/// Starts as the persisted state and is updated in place as the reconciliation
/// inserts rows, so later records see earlier inserts without re-reading.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconciliationSnapshot {
    known: HashMap<String, HashSet<String>>,
}

impl ReconciliationSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains_currency(&self, code: &str) -> bool {
        self.known.contains_key(code)
    }

    /// Record a currency as known with no entities, keeping existing ones
    pub fn mark_currency(&mut self, code: &str) {
        self.known.entry(code.to_string()).or_default();
    }

    pub fn has_entity(&self, code: &str, entity: &str) -> bool {
        self.known
            .get(code)
            .map(|set| set.contains(entity))
            .unwrap_or(false)
    }

    pub fn add_entity(&mut self, code: &str, entity: &str) {
        self.known
            .entry(code.to_string())
            .or_default()
            .insert(entity.to_string());
    }

    pub fn currency_count(&self) -> usize {
        self.known.len()
    }

    pub fn entity_count(&self) -> usize {
        self.known.values().map(HashSet::len).sum()
    }
}

/// Builds the [`ReconciliationSnapshot`] from the currency and entity tables
pub struct PersistedStateReader;

impl PersistedStateReader {
    pub fn read<C: Connection + ?Sized>(conn: &mut C) -> Result<ReconciliationSnapshot> {
        let rows = conn.query(SNAPSHOT_QUERY, &[])?;

        let mut snapshot = ReconciliationSnapshot::new();
        for row in rows {
            let mut cols = row.into_iter();
            let code = match cols.next() {
                Some(Value::Text(code)) => code,
                // rows without an alphabetic code cannot be matched against the dataset
                _ => continue,
            };
            match cols.next() {
                Some(Value::Text(entity)) => snapshot.add_entity(&code, &entity),
                _ => snapshot.mark_currency(&code),
            }
        }

        debug!(
            "persisted snapshot: {} currencies, {} entities",
            snapshot.currency_count(),
            snapshot.entity_count()
        );
        Ok(snapshot)
    }
}
