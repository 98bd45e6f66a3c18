use crate::error::{EggError, Result};
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Default location of the configuration file, relative to the working directory
pub const DEFAULT_CONFIG_PATH: &str = "./etc/eggcounter.json";

/// Default location of the schema text
pub const DEFAULT_SCHEMA_PATH: &str = "./sql/schema.sql";

/// Default location of the ISO 4217 reference dataset
pub const DEFAULT_CURRENCIES_PATH: &str = "./data/iso-4217-currency.json";

/// Connection parameter names whose values are never written to logs
const SECRET_PARAMS: &[&str] = &["password", "passwd", "secret"];

/// How the schema executor reacts to a failing statement
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaMode {
    /// The first failing statement aborts the run
    #[default]
    Strict,
    /// Failing statements are logged and skipped
    Lenient,
}

impl fmt::Display for SchemaMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaMode::Strict => write!(f, "strict"),
            SchemaMode::Lenient => write!(f, "lenient"),
        }
    }
}

impl FromStr for SchemaMode {
    type Err = EggError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "strict" => Ok(SchemaMode::Strict),
            "lenient" => Ok(SchemaMode::Lenient),
            other => Err(EggError::Configuration(format!(
                "schemaMode must be 'strict' or 'lenient', got '{}'",
                other
            ))),
        }
    }
}

/// Database connection settings: a driver name plus driver-specific parameters
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DbConnectionConfig {
    pub driver: String,
    pub params: BTreeMap<String, String>,
}

impl DbConnectionConfig {
    pub fn new(driver: &str) -> Self {
        Self {
            driver: driver.to_string(),
            params: BTreeMap::new(),
        }
    }

    /// Builder-style helper to add a connection parameter
    pub fn with_param(mut self, key: &str, value: &str) -> Self {
        self.params.insert(key.to_string(), value.to_string());
        self
    }

    /// Look up the first parameter present among `keys`
    pub fn param(&self, keys: &[&str]) -> Option<&str> {
        keys.iter()
            .find_map(|k| self.params.get(*k))
            .map(|s| s.as_str())
    }

    /// Parameters with secrets masked, for logging
    pub fn redacted(&self) -> BTreeMap<String, String> {
        self.params
            .iter()
            .map(|(k, v)| {
                if SECRET_PARAMS.contains(&k.to_lowercase().as_str()) {
                    (k.clone(), "***".to_string())
                } else {
                    (k.clone(), v.clone())
                }
            })
            .collect()
    }
}

/// Validated eggcounter configuration
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EggcounterConfig {
    /// Optional configuration version, always numeric when present
    pub version: Option<f64>,

    pub db_connection: DbConnectionConfig,

    /// Path to the `;`-delimited schema text
    pub schema_path: String,

    /// Path or URL of the reference currency dataset
    pub currencies_path: String,

    pub schema_mode: SchemaMode,
}

/// `version` as it appears in the file: a number or a string that should hold one
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawVersion {
    Number(f64),
    Text(String),
}

/// Configuration document before validation
///
/// Keys are accepted in their documented camelCase form and in the lower/snake
/// case forms produced by the `config` crate's environment source.
#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(default)]
    version: Option<RawVersion>,

    #[serde(
        default,
        rename = "dbConnection",
        alias = "dbconnection",
        alias = "db_connection"
    )]
    db_connection: Option<HashMap<String, serde_json::Value>>,

    #[serde(
        default,
        rename = "schemaPath",
        alias = "schemapath",
        alias = "schema_path"
    )]
    schema_path: Option<String>,

    #[serde(
        default,
        rename = "currenciesPath",
        alias = "currenciespath",
        alias = "currencies_path"
    )]
    currencies_path: Option<String>,

    #[serde(
        default,
        rename = "schemaMode",
        alias = "schemamode",
        alias = "schema_mode"
    )]
    schema_mode: Option<String>,
}

impl RawConfig {
    /// Layer `overrides` on top of `self`; any setting present in `overrides` wins
    fn overlay(self, overrides: RawConfig) -> RawConfig {
        let db_connection = match (self.db_connection, overrides.db_connection) {
            (Some(mut base), Some(extra)) => {
                base.extend(extra);
                Some(base)
            }
            (base, extra) => extra.or(base),
        };

        RawConfig {
            version: overrides.version.or(self.version),
            db_connection,
            schema_path: overrides.schema_path.or(self.schema_path),
            currencies_path: overrides.currencies_path.or(self.currencies_path),
            schema_mode: overrides.schema_mode.or(self.schema_mode),
        }
    }
}

/// Environment source for overrides: `EGGCOUNTER_SCHEMA_MODE=lenient`,
/// `EGGCOUNTER_DB_CONNECTION__PATH=/tmp/egg.sqlite3`
fn environment() -> Environment {
    Environment::with_prefix("EGGCOUNTER")
        .prefix_separator("_")
        .separator("__")
}

impl EggcounterConfig {
    /// Load and validate the configuration file at `path`
    ///
    /// Settings from the environment (prefix `EGGCOUNTER`) override the file, e.g.
    /// `EGGCOUNTER_SCHEMA_MODE=lenient eggcounter bootstrap`. Nested connection
    /// parameters use a double underscore: `EGGCOUNTER_DB_CONNECTION__PATH`.
    pub fn load(path: &str) -> Result<EggcounterConfig> {
        Self::load_with_env(path, environment())
    }

    fn load_with_env(path: &str, env: Environment) -> Result<EggcounterConfig> {
        if !Path::new(path).exists() {
            return Err(EggError::Configuration(format!(
                "configuration file '{}' not found",
                path
            )));
        }

        // the two layers spell keys differently (`schemaMode` / `schema_mode`)
        let file = Self::read_raw(Config::builder().add_source(File::with_name(path)))?;
        let overrides = Self::read_raw(Config::builder().add_source(env))?;

        Self::validate(file.overlay(overrides))
    }

    /// Parse and validate a JSON configuration document
    pub fn from_json_str(content: &str) -> Result<EggcounterConfig> {
        let raw = Self::read_raw(
            Config::builder().add_source(File::from_str(content, FileFormat::Json)),
        )?;
        Self::validate(raw)
    }

    fn read_raw(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<RawConfig> {
        let settings = builder
            .build()
            .map_err(|e| EggError::Configuration(format!("failed to read configuration: {}", e)))?;

        settings
            .try_deserialize::<RawConfig>()
            .map_err(|e| EggError::Configuration(format!("malformed configuration: {}", e)))
    }

    /// Turn the raw document into a typed configuration, rejecting invalid values
    fn validate(raw: RawConfig) -> Result<EggcounterConfig> {
        let version = match raw.version {
            None => None,
            Some(RawVersion::Number(n)) => Some(n),
            Some(RawVersion::Text(s)) => Some(s.trim().parse::<f64>().map_err(|e| {
                EggError::Configuration(format!("version must be numeric, got '{}': {}", s, e))
            })?),
        };
        if let Some(v) = version {
            if !v.is_finite() {
                return Err(EggError::Configuration(format!(
                    "version must be a finite number, got {}",
                    v
                )));
            }
        }

        let mut params = raw.db_connection.ok_or_else(|| {
            EggError::Configuration("missing 'dbConnection' section".to_string())
        })?;

        let driver = match params.remove("driver") {
            Some(serde_json::Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
            Some(other) => {
                return Err(EggError::Configuration(format!(
                    "dbConnection.driver must be a non-empty string, got {}",
                    other
                )))
            }
            None => {
                return Err(EggError::Configuration(
                    "missing 'dbConnection.driver'".to_string(),
                ))
            }
        };

        let params = params
            .into_iter()
            .map(|(k, v)| {
                let value = match v {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                };
                (k, value)
            })
            .collect();

        let schema_mode = match raw.schema_mode {
            Some(s) => s.parse()?,
            None => SchemaMode::default(),
        };

        Ok(EggcounterConfig {
            version,
            db_connection: DbConnectionConfig { driver, params },
            schema_path: raw
                .schema_path
                .unwrap_or_else(|| DEFAULT_SCHEMA_PATH.to_string()),
            currencies_path: raw
                .currencies_path
                .unwrap_or_else(|| DEFAULT_CURRENCIES_PATH.to_string()),
            schema_mode,
        })
    }

    /// Configuration for the given connection with all other settings at their defaults
    pub fn with_connection(db_connection: DbConnectionConfig) -> Self {
        Self {
            version: None,
            db_connection,
            schema_path: DEFAULT_SCHEMA_PATH.to_string(),
            currencies_path: DEFAULT_CURRENCIES_PATH.to_string(),
            schema_mode: SchemaMode::default(),
        }
    }

    /// Display configuration summary
    pub fn summary(&self) -> String {
        let mut lines = vec![
            format!("Driver:             {}", self.db_connection.driver),
            format!("Connection:         {:?}", self.db_connection.redacted()),
            format!("Schema Path:        {}", self.schema_path),
            format!("Currencies Path:    {}", self.currencies_path),
            format!("Schema Mode:        {}", self.schema_mode),
        ];
        if let Some(v) = self.version {
            lines.insert(0, format!("Version:            {}", v));
        }
        lines.join("\n")
    }
}
