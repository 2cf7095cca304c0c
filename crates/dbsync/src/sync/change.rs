//! Change records and the sinks that consume them.
//!
//! A table sync produces an ordered sequence of [`Change`] records. Each
//! record is either a log line or a statement for the destination. Sinks
//! decide what happens to them:
//!
//! - [`ExecutingSink`] applies statements to the destination as they arrive
//! - [`CollectingSink`] keeps them for review (dry run)

use std::fmt;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::core::key::KeyTuple;
use crate::core::traits::StatementExecutor;
use crate::core::value::Row;
use crate::error::{Result, SyncError};

/// What a statement is meant to do.
#[derive(Debug, Clone, PartialEq)]
pub enum Intent {
    /// Pre-sync hook (e.g. disable integrity checks).
    SetUp,
    /// Post-sync hook undoing [`Intent::SetUp`].
    TearDown,
    Delete {
        key: KeyTuple,
    },
    Insert {
        row: Row,
    },
    Update {
        values: Row,
        key: KeyTuple,
    },
}

impl Intent {
    pub fn kind(&self) -> &'static str {
        match self {
            Intent::SetUp => "setup",
            Intent::TearDown => "teardown",
            Intent::Delete { .. } => "delete",
            Intent::Insert { .. } => "insert",
            Intent::Update { .. } => "update",
        }
    }

    /// Whether the statement modifies table rows.
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            Intent::Delete { .. } | Intent::Insert { .. } | Intent::Update { .. }
        )
    }
}

/// A generated statement for the destination.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub table: String,
    pub intent: Intent,
    pub sql: String,
}

/// One output record of a table sync.
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    Log { table: String, message: String },
    Statement(Statement),
}

impl Change {
    pub fn log(table: impl Into<String>, message: impl Into<String>) -> Self {
        Change::Log {
            table: table.into(),
            message: message.into(),
        }
    }

    pub fn statement(table: impl Into<String>, intent: Intent, sql: impl Into<String>) -> Self {
        Change::Statement(Statement {
            table: table.into(),
            intent,
            sql: sql.into(),
        })
    }

    pub fn as_statement(&self) -> Option<&Statement> {
        match self {
            Change::Statement(s) => Some(s),
            Change::Log { .. } => None,
        }
    }
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Change::Log { message, .. } => f.write_str(message),
            Change::Statement(s) => f.write_str(&s.sql),
        }
    }
}

/// Consumer of change records.
#[async_trait]
pub trait ChangeSink: Send {
    /// Take one record. An error on a statement means it was not applied.
    async fn accept(&mut self, change: Change) -> Result<()>;
}

/// Applies statements to the destination immediately.
pub struct ExecutingSink<'a, E: StatementExecutor + ?Sized> {
    executor: &'a E,
    executed: u64,
    rows_affected: u64,
}

impl<'a, E: StatementExecutor + ?Sized> ExecutingSink<'a, E> {
    pub fn new(executor: &'a E) -> Self {
        Self {
            executor,
            executed: 0,
            rows_affected: 0,
        }
    }

    /// Statements applied so far.
    pub fn executed(&self) -> u64 {
        self.executed
    }

    pub fn rows_affected(&self) -> u64 {
        self.rows_affected
    }
}

#[async_trait]
impl<'a, E: StatementExecutor + ?Sized> ChangeSink for ExecutingSink<'a, E> {
    async fn accept(&mut self, change: Change) -> Result<()> {
        match change {
            Change::Log { table, message } => {
                info!(table = %table, "{}", message);
                Ok(())
            }
            Change::Statement(statement) => {
                let affected = self
                    .executor
                    .execute(&statement.sql)
                    .await
                    .map_err(|e| {
                        // Lost connections are never a single-row problem.
                        if e.is_connection_error() {
                            e
                        } else {
                            SyncError::write(&statement.table, e)
                        }
                    })?;
                debug!(table = %statement.table, kind = statement.intent.kind(), affected, "{}", statement.sql);
                self.executed += 1;
                self.rows_affected += affected;
                Ok(())
            }
        }
    }
}

/// Keeps statements for later review; log lines are traced and optionally kept.
#[derive(Debug, Default)]
pub struct CollectingSink {
    statements: Vec<Statement>,
    logs: Vec<String>,
    keep_logs: bool,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also keep log lines, in order.
    pub fn with_logs() -> Self {
        Self {
            keep_logs: true,
            ..Self::default()
        }
    }

    pub fn statements(&self) -> &[Statement] {
        &self.statements
    }

    pub fn logs(&self) -> &[String] {
        &self.logs
    }

    /// SQL text of every collected statement.
    pub fn sql(&self) -> Vec<String> {
        self.statements.iter().map(|s| s.sql.clone()).collect()
    }

    pub fn into_statements(self) -> Vec<Statement> {
        self.statements
    }
}

#[async_trait]
impl ChangeSink for CollectingSink {
    async fn accept(&mut self, change: Change) -> Result<()> {
        match change {
            Change::Log { table, message } => {
                info!(table = %table, "{}", message);
                if self.keep_logs {
                    self.logs.push(message);
                }
            }
            Change::Statement(statement) => self.statements.push(statement),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::memory::MemoryEngine;

    #[tokio::test]
    async fn test_collecting_sink_keeps_order() {
        let mut sink = CollectingSink::with_logs();
        sink.accept(Change::log("t", "t / Add to dest: {\"id\":1}"))
            .await
            .unwrap();
        sink.accept(Change::statement("t", Intent::SetUp, "SET X=0;"))
            .await
            .unwrap();
        sink.accept(Change::statement(
            "t",
            Intent::Insert {
                row: Row::new().with("id", 1),
            },
            "INSERT 1;",
        ))
        .await
        .unwrap();
        assert_eq!(sink.sql(), vec!["SET X=0;", "INSERT 1;"]);
        assert_eq!(sink.logs().len(), 1);
    }

    #[tokio::test]
    async fn test_executing_sink_applies_statements() {
        let engine = MemoryEngine::new("db");
        let mut sink = ExecutingSink::new(&engine);
        sink.accept(Change::log("t", "hello")).await.unwrap();
        sink.accept(Change::statement("t", Intent::SetUp, "SET FOREIGN_KEY_CHECKS=0;"))
            .await
            .unwrap();
        assert_eq!(sink.executed(), 1);
        assert_eq!(engine.executed(), vec!["SET FOREIGN_KEY_CHECKS=0;"]);
    }

    #[tokio::test]
    async fn test_executing_sink_reports_row_level_failures() {
        let engine = MemoryEngine::new("db");
        engine.fail_statements_containing("bad");
        let mut sink = ExecutingSink::new(&engine);
        let err = sink
            .accept(Change::statement("t", Intent::SetUp, "bad statement;"))
            .await
            .unwrap_err();
        assert!(err.is_row_level());
        assert_eq!(sink.executed(), 0);
    }

    #[tokio::test]
    async fn test_executing_sink_lost_connection_is_fatal() {
        let engine = MemoryEngine::new("db");
        engine.disconnect_after_statements(0);
        let mut sink = ExecutingSink::new(&engine);
        let err = sink
            .accept(Change::statement(
                "t",
                Intent::Insert {
                    row: Row::new().with("id", 1),
                },
                "INSERT 1;",
            ))
            .await
            .unwrap_err();
        assert!(!err.is_row_level());
        assert!(matches!(err, SyncError::Mysql(sqlx::Error::PoolClosed)));
        assert_eq!(sink.executed(), 0);
    }

    #[test]
    fn test_intent_kinds() {
        assert_eq!(Intent::TearDown.kind(), "teardown");
        assert!(!Intent::SetUp.is_mutation());
        assert!(Intent::Delete {
            key: KeyTuple::from_pairs([("id", 1)])
        }
        .is_mutation());
    }
}
