//! Transactional command orchestration
//!
//! Every command runs the same lifecycle:
//!
//! ```text
//! Uninitialized ─load config─▶ ConfigLoaded ─connect─▶ Connected ─execute─▶ Operating
//!                                                                            │
//!                                                          commit ◀──────────┴──────────▶ rollback
//!                                                         Committed                      RolledBack
//! ```
//!
//! The configuration, tracing span, and connection for a run live in a
//! [`RunContext`] that is handed explicitly to the [`Operation`] being executed.
//! Commit and rollback are decided here, from the operation's `Result`.

use crate::config::{EggcounterConfig, SchemaMode, DEFAULT_SCHEMA_PATH};
use crate::database::{
    resolve_driver, Connection, Connector, CurrencyRegistry, ReconcileReport, RegistryStatus,
    SchemaExecutor, SchemaReport, SchemaSource, TeardownPlan, TeardownPlanner, DEFAULT_SCHEMA,
};
use crate::datasets::ReferenceCurrencyLoader;
use crate::error::{EggError, Result};
use serde::Serialize;
use std::fmt;
use std::path::Path;
use tracing::{debug, error, info, info_span, Span};

/// Lifecycle state of a [`TransactionalCommand`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CommandState {
    Uninitialized,
    ConfigLoaded,
    Connected,
    Operating,
    Committed,
    RolledBack,
}

/// The commands eggcounter can run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Apply the schema, then reconcile the reference currencies
    Bootstrap,
    /// Drop every table declared in the schema
    Teardown,
    /// Report registry row counts without changing anything
    Status,
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Bootstrap => "bootstrap",
            Operation::Teardown => "teardown",
            Operation::Status => "status",
        }
    }

    /// Run the operation against the context's connection
    ///
    /// Nothing is committed or rolled back here, except for the explicit rollback
    /// the reconciliation performs on a failed insert.
    pub fn execute<K: Connector>(&self, ctx: &mut RunContext<K>) -> Result<OperationReport> {
        match self {
            Operation::Bootstrap => {
                let schema = load_schema(ctx.config())?;
                let mode = ctx.config().schema_mode;
                let currencies_path = ctx.config().currencies_path.clone();

                let conn = ctx.cursor()?;
                let schema_report = SchemaExecutor::new(mode).execute(conn, &schema)?;

                let records = ReferenceCurrencyLoader::load(&currencies_path)?;
                let reconcile = CurrencyRegistry::new(conn).reconcile(records)?;

                Ok(OperationReport::Bootstrap(BootstrapReport {
                    schema: schema_report,
                    reconcile,
                }))
            }
            Operation::Teardown => {
                let schema = load_schema(ctx.config())?;
                let conn = ctx.cursor()?;
                let plan = TeardownPlanner::execute(conn, &schema)?;
                Ok(OperationReport::Teardown(plan))
            }
            Operation::Status => {
                let conn = ctx.cursor()?;
                Ok(OperationReport::Status(CurrencyRegistry::new(conn).status()))
            }
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Read the configured schema, falling back to the bundled schema when the
/// default path does not exist
fn load_schema(config: &EggcounterConfig) -> Result<SchemaSource> {
    if config.schema_path == DEFAULT_SCHEMA_PATH && !Path::new(DEFAULT_SCHEMA_PATH).exists() {
        info!("{} not found, using bundled schema", DEFAULT_SCHEMA_PATH);
        return Ok(SchemaSource::parse(DEFAULT_SCHEMA));
    }
    SchemaSource::from_path(&config.schema_path)
}

/// Outcome of a bootstrap run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BootstrapReport {
    pub schema: SchemaReport,
    pub reconcile: ReconcileReport,
}

/// Outcome of an operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "operation", rename_all = "lowercase")]
pub enum OperationReport {
    Bootstrap(BootstrapReport),
    Teardown(TeardownPlan),
    Status(RegistryStatus),
}

impl OperationReport {
    /// Human-readable multi-line summary
    pub fn summary(&self) -> String {
        match self {
            OperationReport::Bootstrap(report) => {
                let mut lines = vec![format!(
                    "schema: {}/{} statements applied",
                    report.schema.succeeded, report.schema.attempted
                )];
                for failure in &report.schema.failures {
                    lines.push(format!(
                        "  skipped statement #{}: {}",
                        failure.index, failure.message
                    ));
                }
                lines.push(format!("currencies: {}", report.reconcile.summary()));
                lines.join("\n")
            }
            OperationReport::Teardown(plan) => {
                format!("dropped {} tables: {}", plan.tables.len(), plan.tables.join(", "))
            }
            OperationReport::Status(status) => {
                let show = |count: Option<u64>| match count {
                    Some(n) => n.to_string(),
                    None => "not initialized".to_string(),
                };
                format!(
                    "currency: {}\nentity:   {}",
                    show(status.currency_count),
                    show(status.entity_count)
                )
            }
        }
    }
}

/// Everything one command run needs, passed explicitly to the operation
pub struct RunContext<K: Connector> {
    config: EggcounterConfig,
    connector: K,
    conn: Option<K::Conn>,
    span: Span,
}

impl<K: Connector> RunContext<K> {
    pub fn new(config: EggcounterConfig, connector: K, operation: Operation) -> Self {
        let span = info_span!("command", op = operation.name());
        Self {
            config,
            connector,
            conn: None,
            span,
        }
    }

    pub fn config(&self) -> &EggcounterConfig {
        &self.config
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    pub fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    /// The connection, established on first request
    pub fn cursor(&mut self) -> Result<&mut K::Conn> {
        if self.conn.is_none() {
            info!(
                "attempting connection to database with {:?}",
                self.config.db_connection.redacted()
            );
            let conn = self.connector.connect(&self.config.db_connection)?;
            info!("connection established");
            self.conn = Some(conn);
        }
        self.conn
            .as_mut()
            .ok_or_else(|| EggError::Connection("connection unavailable".to_string()))
    }

    pub fn commit(&mut self) -> Result<()> {
        match self.conn.as_mut() {
            Some(conn) => conn.commit(),
            None => Ok(()),
        }
    }

    pub fn rollback(&mut self) -> Result<()> {
        match self.conn.as_mut() {
            Some(conn) => conn.rollback(),
            None => Ok(()),
        }
    }
}

impl<K: Connector> Drop for RunContext<K> {
    fn drop(&mut self) {
        if let Some(mut conn) = self.conn.take() {
            // anything still open at this point was never committed
            if let Err(e) = conn.rollback() {
                error!("rollback while releasing connection failed: {}", e);
            }
            debug!("connection released");
        }
    }
}

fn log_transition(from: CommandState, to: CommandState) {
    debug!("command state {:?} -> {:?}", from, to);
}

/// Drives one [`Operation`] through the command lifecycle
pub struct TransactionalCommand<K: Connector> {
    operation: Operation,
    state: CommandState,
    config: Option<EggcounterConfig>,
    ctx: Option<RunContext<K>>,
}

impl<K: Connector> TransactionalCommand<K> {
    pub fn new(operation: Operation) -> Self {
        Self {
            operation,
            state: CommandState::Uninitialized,
            config: None,
            ctx: None,
        }
    }

    pub fn state(&self) -> CommandState {
        self.state
    }

    /// The loaded configuration, before or after connecting
    pub fn config(&self) -> Result<&EggcounterConfig> {
        match (&self.config, &self.ctx) {
            (Some(config), _) => Ok(config),
            (None, Some(ctx)) => Ok(ctx.config()),
            (None, None) => Err(EggError::Configuration(
                "configuration not loaded".to_string(),
            )),
        }
    }

    /// `Uninitialized → ConfigLoaded` from a configuration file
    pub fn load_config(&mut self, path: &str) -> Result<()> {
        let config = EggcounterConfig::load(path)?;
        self.configure(config)
    }

    /// `Uninitialized → ConfigLoaded` from an already validated configuration
    pub fn configure(&mut self, config: EggcounterConfig) -> Result<()> {
        if self.state != CommandState::Uninitialized {
            return Err(EggError::Configuration(format!(
                "cannot load configuration in state {:?}",
                self.state
            )));
        }
        if let Some(version) = config.version {
            debug!("configuration version {}", version);
        }
        self.config = Some(config);
        log_transition(self.state, CommandState::ConfigLoaded);
        self.state = CommandState::ConfigLoaded;
        Ok(())
    }

    /// Replace the configured schema mode, e.g. from a command-line flag
    pub fn override_schema_mode(&mut self, mode: SchemaMode) {
        if let Some(config) = self.config.as_mut() {
            config.schema_mode = mode;
        }
    }

    /// `ConfigLoaded → Connected`
    pub fn connect(&mut self, connector: K) -> Result<()> {
        let config = match (self.state, self.config.take()) {
            (CommandState::ConfigLoaded, Some(config)) => config,
            (state, config) => {
                self.config = config;
                return Err(EggError::Connection(format!(
                    "cannot connect in state {:?}",
                    state
                )));
            }
        };

        let mut ctx = RunContext::new(config, connector, self.operation);
        {
            let _guard = ctx.span().clone().entered();
            ctx.cursor()?;
        }
        self.ctx = Some(ctx);
        log_transition(self.state, CommandState::Connected);
        self.state = CommandState::Connected;
        Ok(())
    }

    /// `Connected → Operating → Committed | RolledBack`
    pub fn execute(&mut self) -> Result<OperationReport> {
        if self.state != CommandState::Connected {
            return Err(EggError::Connection(format!(
                "cannot execute in state {:?}",
                self.state
            )));
        }
        let ctx = match self.ctx.as_mut() {
            Some(ctx) => ctx,
            None => return Err(EggError::Connection("not connected".to_string())),
        };
        let _guard = ctx.span().clone().entered();

        log_transition(self.state, CommandState::Operating);
        self.state = CommandState::Operating;
        info!("running {}", self.operation);

        let result = self.operation.execute(ctx).and_then(|report| {
            ctx.commit()?;
            Ok(report)
        });

        let next = match &result {
            Ok(_) => {
                info!("{} committed", self.operation);
                CommandState::Committed
            }
            Err(e) => {
                error!("{} failed ({}): {}", self.operation, e.kind(), e);
                if let Err(rollback_err) = ctx.rollback() {
                    error!("rollback failed: {}", rollback_err);
                }
                CommandState::RolledBack
            }
        };
        log_transition(self.state, next);
        self.state = next;

        result
    }
}

/// Run `operation` with the configuration at `config_path`
///
/// This is the composition root: the driver named in the configuration is
/// resolved here and handed to the command as its connector.
pub fn run(
    config_path: &str,
    operation: Operation,
    schema_mode: Option<SchemaMode>,
) -> Result<OperationReport> {
    let mut command = TransactionalCommand::new(operation);
    command.load_config(config_path)?;
    if let Some(mode) = schema_mode {
        command.override_schema_mode(mode);
    }

    let connector = resolve_driver(&command.config()?.db_connection.driver)?;
    command.connect(connector)?;
    command.execute()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DbConnectionConfig;
    use crate::database::{DatabaseConn, SqliteConnector};
    use tempfile::TempDir;

    const DATASET: &str = r#"[
        {"Entity": "UNITED STATES", "Currency": "US Dollar", "Alphabetic_Code": "USD",
         "Numeric_Code": "840", "Withdrawal_Date": null, "Withdrawal_Interval": null},
        {"Entity": "FRANCE", "Currency": "Euro", "Alphabetic_Code": "EUR",
         "Numeric_Code": 978, "Withdrawal_Date": null, "Withdrawal_Interval": null},
        {"Entity": "GERMANY", "Currency": "Euro", "Alphabetic_Code": "EUR",
         "Numeric_Code": 978, "Withdrawal_Date": null, "Withdrawal_Interval": null},
        {"Entity": "GERMANY", "Currency": "Deutsche Mark", "Alphabetic_Code": "DEM",
         "Numeric_Code": 276, "Withdrawal_Date": "2002-03", "Withdrawal_Interval": null}
    ]"#;

    struct Workspace {
        dir: TempDir,
    }

    impl Workspace {
        fn new(schema: &str) -> Self {
            let dir = tempfile::tempdir().unwrap();
            std::fs::write(dir.path().join("schema.sql"), schema).unwrap();
            std::fs::write(dir.path().join("currencies.json"), DATASET).unwrap();
            Self { dir }
        }

        fn path(&self, name: &str) -> String {
            self.dir.path().join(name).to_str().unwrap().to_string()
        }

        fn config(&self, mode: SchemaMode) -> EggcounterConfig {
            let mut config = EggcounterConfig::with_connection(
                DbConnectionConfig::new("sqlite").with_param("path", &self.path("egg.sqlite3")),
            );
            config.schema_path = self.path("schema.sql");
            config.currencies_path = self.path("currencies.json");
            config.schema_mode = mode;
            config
        }

        fn run(&self, operation: Operation, mode: SchemaMode) -> (CommandState, Result<OperationReport>) {
            let mut command = TransactionalCommand::new(operation);
            command.configure(self.config(mode)).unwrap();
            command.connect(SqliteConnector).unwrap();
            let result = command.execute();
            (command.state(), result)
        }

        fn open(&self) -> DatabaseConn {
            DatabaseConn::open_path(&self.path("egg.sqlite3")).unwrap()
        }
    }

    #[test]
    fn test_bootstrap_commits() {
        let ws = Workspace::new(DEFAULT_SCHEMA);
        let (state, result) = ws.run(Operation::Bootstrap, SchemaMode::Strict);

        assert_eq!(state, CommandState::Committed);
        let report = match result.unwrap() {
            OperationReport::Bootstrap(report) => report,
            other => panic!("unexpected report: {other:?}"),
        };
        assert!(report.schema.failures.is_empty());
        assert_eq!(report.reconcile.currencies_inserted.len(), 2);
        assert_eq!(report.reconcile.entities_inserted.len(), 3);
        assert_eq!(report.reconcile.withdrawn_skipped, 1);

        let db = ws.open();
        assert_eq!(db.table_count("currency").unwrap(), 2);
        assert_eq!(db.table_count("entity").unwrap(), 3);
    }

    #[test]
    fn test_bootstrap_twice_inserts_nothing_new() {
        let ws = Workspace::new(DEFAULT_SCHEMA);
        ws.run(Operation::Bootstrap, SchemaMode::Strict).1.unwrap();
        let (state, result) = ws.run(Operation::Bootstrap, SchemaMode::Strict);

        assert_eq!(state, CommandState::Committed);
        match result.unwrap() {
            OperationReport::Bootstrap(report) => {
                assert!(report.reconcile.currencies_inserted.is_empty());
                assert!(report.reconcile.entities_inserted.is_empty());
            }
            other => panic!("unexpected report: {other:?}"),
        }
        assert_eq!(ws.open().table_count("currency").unwrap(), 2);
    }

    const BROKEN_SCHEMA: &str = "CREATE TABLE a (x INT);
        CREATE TABL broken (x INT);
        CREATE TABLE b (x INT);";

    #[test]
    fn test_strict_failure_rolls_back() {
        let ws = Workspace::new(BROKEN_SCHEMA);
        let (state, result) = ws.run(Operation::Bootstrap, SchemaMode::Strict);

        assert_eq!(state, CommandState::RolledBack);
        assert!(matches!(
            result.unwrap_err(),
            EggError::StatementExecution { .. }
        ));

        let db = ws.open();
        assert!(!db.table_exists("a").unwrap());
        assert!(!db.table_exists("b").unwrap());
    }

    #[test]
    fn test_lenient_failure_is_reported() {
        // the broken schema has no registry tables, so reconciliation needs them too
        let schema = format!("{};\n{}", BROKEN_SCHEMA, DEFAULT_SCHEMA);
        let ws = Workspace::new(&schema);
        let (state, result) = ws.run(Operation::Bootstrap, SchemaMode::Lenient);

        assert_eq!(state, CommandState::Committed);
        match result.unwrap() {
            OperationReport::Bootstrap(report) => {
                assert_eq!(report.schema.failures.len(), 1);
                assert_eq!(report.schema.failures[0].statement, "CREATE TABL broken (x INT)");
            }
            other => panic!("unexpected report: {other:?}"),
        }

        let db = ws.open();
        assert!(db.table_exists("a").unwrap());
        assert!(db.table_exists("b").unwrap());
        assert_eq!(db.table_count("currency").unwrap(), 2);
    }

    #[test]
    fn test_missing_dataset_rolls_back_schema() {
        let ws = Workspace::new(DEFAULT_SCHEMA);
        let mut config = ws.config(SchemaMode::Strict);
        config.currencies_path = ws.path("missing.json");

        let mut command = TransactionalCommand::new(Operation::Bootstrap);
        command.configure(config).unwrap();
        command.connect(SqliteConnector).unwrap();
        assert!(command.execute().is_err());
        assert_eq!(command.state(), CommandState::RolledBack);

        assert!(!ws.open().table_exists("currency").unwrap());
    }

    #[test]
    fn test_teardown_after_bootstrap() {
        let ws = Workspace::new(DEFAULT_SCHEMA);
        ws.run(Operation::Bootstrap, SchemaMode::Strict).1.unwrap();

        let (state, result) = ws.run(Operation::Teardown, SchemaMode::Strict);
        assert_eq!(state, CommandState::Committed);
        match result.unwrap() {
            OperationReport::Teardown(plan) => assert_eq!(plan.tables, vec!["currency", "entity"]),
            other => panic!("unexpected report: {other:?}"),
        }

        let db = ws.open();
        assert!(!db.table_exists("currency").unwrap());
        assert!(!db.table_exists("entity").unwrap());
    }

    #[test]
    fn test_teardown_of_missing_tables_rolls_back() {
        let ws = Workspace::new(DEFAULT_SCHEMA);
        let (state, result) = ws.run(Operation::Teardown, SchemaMode::Strict);

        assert_eq!(state, CommandState::RolledBack);
        assert!(result.is_err());
    }

    #[test]
    fn test_status() {
        let ws = Workspace::new(DEFAULT_SCHEMA);
        let (_, result) = ws.run(Operation::Status, SchemaMode::Strict);
        assert_eq!(
            result.unwrap(),
            OperationReport::Status(RegistryStatus::default())
        );

        ws.run(Operation::Bootstrap, SchemaMode::Strict).1.unwrap();
        let (state, result) = ws.run(Operation::Status, SchemaMode::Strict);
        assert_eq!(state, CommandState::Committed);
        assert_eq!(
            result.unwrap(),
            OperationReport::Status(RegistryStatus {
                currency_count: Some(2),
                entity_count: Some(3),
            })
        );
    }

    #[test]
    fn test_state_transitions() {
        let ws = Workspace::new(DEFAULT_SCHEMA);
        let mut command = TransactionalCommand::new(Operation::Status);
        assert_eq!(command.state(), CommandState::Uninitialized);
        assert!(command.config().is_err());

        // connecting before configuration is refused
        assert!(command.connect(SqliteConnector).is_err());
        assert!(command.execute().is_err());
        assert_eq!(command.state(), CommandState::Uninitialized);

        command.configure(ws.config(SchemaMode::Strict)).unwrap();
        assert_eq!(command.state(), CommandState::ConfigLoaded);
        assert!(command.configure(ws.config(SchemaMode::Strict)).is_err());

        command.connect(SqliteConnector).unwrap();
        assert_eq!(command.state(), CommandState::Connected);

        command.execute().unwrap();
        assert_eq!(command.state(), CommandState::Committed);

        // a finished command cannot run again
        assert!(command.execute().is_err());
        assert_eq!(command.state(), CommandState::Committed);
    }

    #[test]
    fn test_connection_failure_is_fatal() {
        let mut config = EggcounterConfig::with_connection(
            DbConnectionConfig::new("sqlite").with_param("path", "/nonexistent/dir/egg.sqlite3"),
        );
        config.schema_mode = SchemaMode::Lenient;

        let mut command = TransactionalCommand::new(Operation::Bootstrap);
        command.configure(config).unwrap();
        let err = command.connect(SqliteConnector).unwrap_err();
        assert!(matches!(err, EggError::Connection(_)));
        assert_eq!(command.state(), CommandState::ConfigLoaded);
    }

    #[test]
    fn test_cursor_connects_lazily() {
        let config = EggcounterConfig::with_connection(DbConnectionConfig::new("sqlite"));
        let mut ctx = RunContext::new(config, SqliteConnector, Operation::Status);
        assert!(!ctx.is_connected());

        ctx.cursor()
            .unwrap()
            .execute("CREATE TABLE t (x INT)", &[])
            .unwrap();
        assert!(ctx.is_connected());

        // same connection: the table created above is visible
        ctx.cursor().unwrap().execute("INSERT INTO t VALUES (1)", &[]).unwrap();
        ctx.commit().unwrap();
    }

    #[test]
    fn test_run_from_config_file() {
        let ws = Workspace::new(DEFAULT_SCHEMA);
        let config_path = ws.path("eggcounter.json");
        std::fs::write(
            &config_path,
            serde_json::json!({
                "version": "1.0",
                "dbConnection": {"driver": "sqlite", "path": ws.path("egg.sqlite3")},
                "schemaPath": ws.path("schema.sql"),
                "currenciesPath": ws.path("currencies.json"),
            })
            .to_string(),
        )
        .unwrap();

        let report = run(&config_path, Operation::Bootstrap, None).unwrap();
        assert!(matches!(report, OperationReport::Bootstrap(_)));
        assert_eq!(ws.open().table_count("entity").unwrap(), 3);
    }

    #[test]
    fn test_run_unknown_driver() {
        let ws = Workspace::new(DEFAULT_SCHEMA);
        let config_path = ws.path("eggcounter.json");
        std::fs::write(&config_path, r#"{"dbConnection": {"driver": "oracle"}}"#).unwrap();

        let err = run(&config_path, Operation::Status, None).unwrap_err();
        assert!(matches!(err, EggError::DriverLoad(_)));
    }

    #[test]
    fn test_run_bad_version() {
        let ws = Workspace::new(DEFAULT_SCHEMA);
        let config_path = ws.path("eggcounter.json");
        std::fs::write(
            &config_path,
            r#"{"version": "latest", "dbConnection": {"driver": "sqlite"}}"#,
        )
        .unwrap();

        let err = run(&config_path, Operation::Status, None).unwrap_err();
        assert!(matches!(err, EggError::Configuration(_)));
    }

    #[test]
    fn test_report_serialization() {
        let report = OperationReport::Teardown(TeardownPlan {
            tables: vec!["currency".to_string()],
        });
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["operation"], "teardown");
        assert_eq!(json["tables"][0], "currency");
    }
}
