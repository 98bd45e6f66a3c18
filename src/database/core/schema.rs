//! Schema text handling
//!
//! A schema is a single text resource of `;`-delimited SQL statements. The same
//! text drives both directions: [`SchemaExecutor`] applies it during bootstrap and
//! [`TeardownPlanner`] scans it for `CREATE TABLE` targets during teardown, so the
//! list of tables has exactly one source of truth.

use crate::config::SchemaMode;
use crate::database::core::Connection;
use crate::error::{EggError, Result};
use regex::Regex;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::OnceLock;
use tracing::{debug, info, warn};

/// Ordered SQL statements extracted from a schema text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaSource {
    text: String,
    statements: Vec<String>,
}

impl SchemaSource {
    /// Parse schema text into statements
    ///
    /// Comments are dropped, the text is split on `;` outside of quoted literals,
    /// every fragment is trimmed, and empty fragments are discarded.
    pub fn parse(text: &str) -> Self {
        let stripped = strip_comments(text);
        let statements = split_statements(&stripped);
        Self {
            text: stripped,
            statements,
        }
    }

    /// Read and parse the schema file at `path`
    pub fn from_path(path: &str) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            EggError::Io(std::io::Error::new(
                e.kind(),
                format!("unable to read schema '{}': {}", path, e),
            ))
        })?;
        Ok(Self::parse(&text))
    }

    pub fn statements(&self) -> &[String] {
        &self.statements
    }

    /// The schema text with comments removed
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Lexer {
    Code,
    SingleQuoted,
    DoubleQuoted,
    LineComment,
    BlockComment,
}

/// Remove `--` and `/* */` comments, leaving quoted literals intact
fn strip_comments(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut state = Lexer::Code;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        match state {
            Lexer::Code => match c {
                '-' if chars.peek() == Some(&'-') => {
                    chars.next();
                    state = Lexer::LineComment;
                }
                '/' if chars.peek() == Some(&'*') => {
                    chars.next();
                    // keep tokens on either side of the comment apart
                    out.push(' ');
                    state = Lexer::BlockComment;
                }
                '\'' => {
                    out.push(c);
                    state = Lexer::SingleQuoted;
                }
                '"' => {
                    out.push(c);
                    state = Lexer::DoubleQuoted;
                }
                _ => out.push(c),
            },
            Lexer::SingleQuoted => {
                out.push(c);
                if c == '\'' {
                    state = Lexer::Code;
                }
            }
            Lexer::DoubleQuoted => {
                out.push(c);
                if c == '"' {
                    state = Lexer::Code;
                }
            }
            Lexer::LineComment => {
                if c == '\n' {
                    out.push('\n');
                    state = Lexer::Code;
                }
            }
            Lexer::BlockComment => {
                if c == '*' && chars.peek() == Some(&'/') {
                    chars.next();
                    state = Lexer::Code;
                }
            }
        }
    }

    out
}

/// Split comment-free text on `;` outside quoted literals
fn split_statements(text: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;

    for c in text.chars() {
        match quote {
            Some(q) => {
                current.push(c);
                if c == q {
                    quote = None;
                }
            }
            None => match c {
                ';' => {
                    statements.push(std::mem::take(&mut current));
                }
                '\'' | '"' => {
                    quote = Some(c);
                    current.push(c);
                }
                _ => current.push(c),
            },
        }
    }
    statements.push(current);

    statements
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// A statement that failed in lenient mode
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatementFailure {
    pub index: usize,
    pub statement: String,
    pub message: String,
}

/// Outcome of applying a schema
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SchemaReport {
    pub attempted: usize,
    pub succeeded: usize,
    pub failures: Vec<StatementFailure>,
}

/// Applies schema statements in order against the open transaction
pub struct SchemaExecutor {
    mode: SchemaMode,
}

impl SchemaExecutor {
    pub fn new(mode: SchemaMode) -> Self {
        Self { mode }
    }

    /// Execute every statement of `schema`
    ///
    /// In strict mode the first failure is returned as
    /// [`EggError::StatementExecution`] and no later statement runs; the caller
    /// must roll back. In lenient mode failures are logged, recorded in the
    /// report, and execution continues. Nothing is committed here.
    pub fn execute<C: Connection + ?Sized>(
        &self,
        conn: &mut C,
        schema: &SchemaSource,
    ) -> Result<SchemaReport> {
        info!(
            "importing schema: {} statements ({} mode)",
            schema.statements().len(),
            self.mode
        );

        if schema.is_empty() {
            warn!("schema contains no statements");
        }

        let mut report = SchemaReport::default();
        for (index, statement) in schema.statements().iter().enumerate() {
            debug!("{}", statement);
            report.attempted += 1;

            match conn.execute(statement, &[]) {
                Ok(_) => report.succeeded += 1,
                Err(e) => match self.mode {
                    SchemaMode::Strict => {
                        return Err(EggError::statement(statement, e));
                    }
                    SchemaMode::Lenient => {
                        warn!("skipping failed statement #{}: {}\n{}", index, e, statement);
                        report.failures.push(StatementFailure {
                            index,
                            statement: statement.clone(),
                            message: e.to_string(),
                        });
                    }
                },
            }
        }

        Ok(report)
    }
}

#[allow(clippy::unwrap_used)]
fn create_table_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r#"(?i)\bCREATE\s+(?:TEMP\s+|TEMPORARY\s+)?TABLE\s+(?:IF\s+NOT\s+EXISTS\s+)?((?:"[^"]+"|`[^`]+`|\[[^\]]+\]|[A-Za-z_][A-Za-z0-9_$]*)(?:\.(?:"[^"]+"|`[^`]+`|\[[^\]]+\]|[A-Za-z_][A-Za-z0-9_$]*))?)\s*\("#,
        )
        .unwrap()
    })
}

/// Tables to drop, in the order they are declared in the schema
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TeardownPlan {
    pub tables: Vec<String>,
}

impl TeardownPlan {
    /// The drop statements for this plan
    ///
    /// One `DROP TABLE a, b, ...` when the connection accepts it, otherwise one
    /// statement per table in declaration order. No dependency ordering is done.
    pub fn statements(&self, multi_table: bool) -> Vec<String> {
        if self.tables.is_empty() {
            return vec![];
        }
        if multi_table {
            vec![format!("DROP TABLE {}", self.tables.join(", "))]
        } else {
            self.tables
                .iter()
                .map(|t| format!("DROP TABLE {}", t))
                .collect()
        }
    }
}

/// Identity of a table name as SQL resolves it: quotes removed, case folded
fn table_key(name: &str) -> String {
    name.split('.')
        .map(|part| {
            part.trim_matches(|c| matches!(c, '"' | '`' | '[' | ']'))
                .to_lowercase()
        })
        .collect::<Vec<_>>()
        .join(".")
}

/// Derives the teardown plan from the bootstrap schema text
pub struct TeardownPlanner;

impl TeardownPlanner {
    /// Extract every `CREATE TABLE <name> (` target, keeping first occurrence order
    pub fn plan(schema: &SchemaSource) -> TeardownPlan {
        let mut tables: Vec<String> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        for caps in create_table_regex().captures_iter(schema.text()) {
            if let Some(name) = caps.get(1) {
                if seen.insert(table_key(name.as_str())) {
                    tables.push(name.as_str().to_string());
                }
            }
        }
        TeardownPlan { tables }
    }

    /// Drop every table declared in `schema`
    ///
    /// Failures propagate unchanged; there is no compensating action for a
    /// partially executed drop.
    pub fn execute<C: Connection + ?Sized>(
        conn: &mut C,
        schema: &SchemaSource,
    ) -> Result<TeardownPlan> {
        let plan = Self::plan(schema);
        info!("dropping {} tables: {}", plan.tables.len(), plan.tables.join(", "));

        for statement in plan.statements(conn.supports_multi_table_drop()) {
            debug!("{}", statement);
            conn.execute(&statement, &[])
                .map_err(|e| EggError::statement(&statement, e))?;
        }

        Ok(plan)
    }
}
