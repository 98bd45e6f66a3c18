//! ISO 4217 reference dataset handling.
//!
//! Data source: the ISO 4217 currency list as published on datahub.io, an array
//! of objects with one entry per (entity, currency) pair:
//!
//! ```json
//! {"Entity": "FRANCE", "Currency": "Euro", "Alphabetic_Code": "EUR",
//!  "Numeric_Code": 978, "Minor_Unit": "2",
//!  "Withdrawal_Date": null, "Withdrawal_Interval": null}
//! ```
//!
//! The loader only parses and validates records. Deciding which records matter
//! (withdrawn currencies, entities without a currency) is the job of the
//! reconciliation engine.

use crate::error::{EggError, Result};
use serde::Serialize;
use serde_json::{Map, Value};
use std::path::Path;
use tracing::info;

/// Upstream location of the ISO 4217 currency list
pub const ISO4217_DATAHUB_URL: &str =
    "https://datahub.io/core/currency-codes/r/codes-all.json";

const KEY_ALPHABETIC_CODE: &str = "Alphabetic_Code";
const KEY_NUMERIC_CODE: &str = "Numeric_Code";
const KEY_CURRENCY: &str = "Currency";
const KEY_ENTITY: &str = "Entity";
const KEY_WITHDRAWAL_DATE: &str = "Withdrawal_Date";
const KEY_WITHDRAWAL_INTERVAL: &str = "Withdrawal_Interval";

const REQUIRED_KEYS: &[&str] = &[
    KEY_ALPHABETIC_CODE,
    KEY_NUMERIC_CODE,
    KEY_CURRENCY,
    KEY_ENTITY,
    KEY_WITHDRAWAL_DATE,
    KEY_WITHDRAWAL_INTERVAL,
];

/// One row of the reference dataset
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CurrencyRecord {
    /// Three-letter code; `None` for entities without a universal currency
    pub alphabetic_code: Option<String>,
    pub numeric_code: Option<i64>,
    /// Display name of the currency
    pub currency: String,
    /// Country or entity using the currency, as spelled in the dataset
    pub entity: String,
    pub withdrawal_date: Option<String>,
    pub withdrawal_interval: Option<String>,
}

impl CurrencyRecord {
    /// An active record with both codes set
    pub fn active(alphabetic_code: &str, numeric_code: i64, currency: &str, entity: &str) -> Self {
        Self {
            alphabetic_code: Some(alphabetic_code.to_string()),
            numeric_code: Some(numeric_code),
            currency: currency.to_string(),
            entity: entity.to_string(),
            withdrawal_date: None,
            withdrawal_interval: None,
        }
    }

    /// Withdrawn currencies carry a withdrawal date or interval
    pub fn is_withdrawn(&self) -> bool {
        self.withdrawal_date.is_some() || self.withdrawal_interval.is_some()
    }

    /// Entity name as persisted: case-folded
    pub fn normalized_entity(&self) -> String {
        self.entity.trim().to_lowercase()
    }
}

/// Lazy sequence of parsed records
///
/// Each record is validated when it is pulled, so a malformed row surfaces as an
/// `Err` item at its position in the dataset.
pub struct CurrencyRecords {
    rows: std::iter::Enumerate<std::vec::IntoIter<Value>>,
}

impl Iterator for CurrencyRecords {
    type Item = Result<CurrencyRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        self.rows
            .next()
            .map(|(index, value)| parse_record(index, value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.rows.size_hint()
    }
}

/// Reads the ISO 4217 reference dataset
pub struct ReferenceCurrencyLoader;

impl ReferenceCurrencyLoader {
    /// Load the dataset from a local path or a URL
    ///
    /// Compressed files are handled by `oneio` based on their extension.
    pub fn load(path: &str) -> Result<CurrencyRecords> {
        if !path.contains("://") && !Path::new(path).exists() {
            return Err(EggError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!(
                    "reference dataset '{}' not found (the full list is published at {})",
                    path, ISO4217_DATAHUB_URL
                ),
            )));
        }

        info!("loading reference currencies from {}", path);
        let rows: Vec<Value> = oneio::read_json_struct(path).map_err(|e| {
            EggError::DataFormat(format!("failed to read reference dataset {}: {}", path, e))
        })?;

        Ok(Self::from_rows(rows))
    }

    /// Parse a dataset held in memory
    pub fn from_json_str(content: &str) -> Result<CurrencyRecords> {
        let rows: Vec<Value> = serde_json::from_str(content).map_err(|e| {
            EggError::DataFormat(format!("reference dataset is not a JSON array: {}", e))
        })?;
        Ok(Self::from_rows(rows))
    }

    pub fn from_rows(rows: Vec<Value>) -> CurrencyRecords {
        CurrencyRecords {
            rows: rows.into_iter().enumerate(),
        }
    }
}

fn parse_record(index: usize, value: Value) -> Result<CurrencyRecord> {
    let obj = match value {
        Value::Object(obj) => obj,
        other => {
            return Err(EggError::DataFormat(format!(
                "record #{} is not an object: {}",
                index, other
            )))
        }
    };

    let missing: Vec<&str> = REQUIRED_KEYS
        .iter()
        .filter(|k| !obj.contains_key(**k))
        .copied()
        .collect();
    if !missing.is_empty() {
        return Err(EggError::DataFormat(format!(
            "record #{} is missing {}",
            index,
            missing.join(", ")
        )));
    }

    let currency = optional_text(&obj, KEY_CURRENCY, index)?.ok_or_else(|| {
        EggError::DataFormat(format!("record #{} has a null {}", index, KEY_CURRENCY))
    })?;
    let entity = optional_text(&obj, KEY_ENTITY, index)?.ok_or_else(|| {
        EggError::DataFormat(format!("record #{} has a null {}", index, KEY_ENTITY))
    })?;

    Ok(CurrencyRecord {
        alphabetic_code: optional_text(&obj, KEY_ALPHABETIC_CODE, index)?,
        numeric_code: numeric_code(&obj, index)?,
        currency,
        entity,
        withdrawal_date: optional_text(&obj, KEY_WITHDRAWAL_DATE, index)?,
        withdrawal_interval: optional_text(&obj, KEY_WITHDRAWAL_INTERVAL, index)?,
    })
}

/// A nullable text field; numbers are accepted and stringified, blanks rejected
fn optional_text(obj: &Map<String, Value>, key: &str, index: usize) -> Result<Option<String>> {
    match obj.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => Err(EggError::DataFormat(format!(
            "record #{} has an empty {}",
            index, key
        ))),
        Some(Value::String(s)) => Ok(Some(s.trim().to_string())),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(EggError::DataFormat(format!(
            "record #{} has a non-text {}: {}",
            index, key, other
        ))),
    }
}

/// `Numeric_Code` as an integer: JSON integers, integral floats, or numeric strings
fn numeric_code(obj: &Map<String, Value>, index: usize) -> Result<Option<i64>> {
    let bad = |v: &Value| {
        EggError::DataFormat(format!(
            "record #{} has an invalid {}: {}",
            index, KEY_NUMERIC_CODE, v
        ))
    };

    match obj.get(KEY_NUMERIC_CODE) {
        None | Some(Value::Null) => Ok(None),
        Some(v @ Value::Number(n)) => match (n.as_i64(), n.as_f64()) {
            (Some(i), _) => Ok(Some(i)),
            (None, Some(f)) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => {
                Ok(Some(f as i64))
            }
            _ => Err(bad(v)),
        },
        Some(v @ Value::String(s)) => {
            let s = s.trim();
            if s.is_empty() {
                return Ok(None);
            }
            s.parse::<i64>()
                .or_else(|_| match s.parse::<f64>() {
                    Ok(f) if f.fract() == 0.0 => Ok(f as i64),
                    _ => Err(()),
                })
                .map(Some)
                .map_err(|_| bad(v))
        }
        Some(v) => Err(bad(v)),
    }
}
