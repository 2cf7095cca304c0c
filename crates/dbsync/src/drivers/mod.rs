//! Database driver implementations.
//!
//! This module provides database-specific implementations of the core traits:
//!
//! - [`mysql`]: MySQL and MariaDB driver (sqlx)
//! - [`postgres`]: PostgreSQL driver (tokio-postgres + deadpool)
//! - [`common`]: Shared utilities (TLS, version checks, row streaming)
//!
//! # Architecture
//!
//! Each driver module implements:
//! - `Dialect`: SQL syntax strategy and statement factory
//! - `DataProvider`: window, count, fingerprint and row queries
//! - `TableProvider`: catalog metadata
//! - `StatementExecutor`: applies generated statements
//!
//! # Enum dispatch
//!
//! [`Engine`] wraps the concrete engines in an enum and forwards every trait
//! method with a match instead of boxing a trait object.
//!
//! # Adding New Databases
//!
//! 1. Create a new module under `drivers/`
//! 2. Implement the four traits above
//! 3. Add a variant to [`EngineKind`] and [`Engine`]

pub mod common;
pub mod mysql;
pub mod postgres;

#[cfg(test)]
pub(crate) mod memory;

pub use common::{ServerVersion, SslMode, TlsBuilder};
pub use mysql::{MysqlDialect, MysqlEngine, MysqlFlavor};
pub use postgres::{PostgresDialect, PostgresEngine};

use std::fmt;

use async_trait::async_trait;

use crate::config::ConnectionConfig;
use crate::core::key::KeyTuple;
use crate::core::schema::{Column, ForeignKey, Table};
use crate::core::traits::{
    DataProvider, DbEngine, Dialect, FingerprintMap, RowStream, StatementExecutor, TableProvider,
};
use crate::error::{Result, SyncError};

/// Supported database types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineKind {
    Mysql,
    MariaDb,
    Postgres,
}

impl EngineKind {
    /// Parse a configured `type` value.
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "mysql" => Ok(EngineKind::Mysql),
            "mariadb" | "maria" => Ok(EngineKind::MariaDb),
            "postgres" | "postgresql" | "pg" => Ok(EngineKind::Postgres),
            other => Err(SyncError::Config(format!(
                "Unknown database type '{}'. Valid values: mysql, mariadb, postgres",
                other
            ))),
        }
    }

    pub fn default_port(&self) -> u16 {
        match self {
            EngineKind::Mysql | EngineKind::MariaDb => 3306,
            EngineKind::Postgres => 5432,
        }
    }

    /// Default `ssl_mode` when none is configured.
    pub fn default_ssl_mode(&self) -> &'static str {
        match self {
            EngineKind::Mysql | EngineKind::MariaDb => "prefer",
            EngineKind::Postgres => "disable",
        }
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EngineKind::Mysql => "mysql",
            EngineKind::MariaDb => "mariadb",
            EngineKind::Postgres => "postgres",
        };
        f.write_str(name)
    }
}

/// A connected engine of any supported type.
pub enum Engine {
    Mysql(MysqlEngine),
    Postgres(PostgresEngine),
}

impl Engine {
    /// Connect according to `config.type`.
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        match config.kind()? {
            EngineKind::Mysql => Ok(Engine::Mysql(
                MysqlEngine::connect(config, MysqlFlavor::Mysql).await?,
            )),
            EngineKind::MariaDb => Ok(Engine::Mysql(
                MysqlEngine::connect(config, MysqlFlavor::MariaDb).await?,
            )),
            EngineKind::Postgres => Ok(Engine::Postgres(PostgresEngine::connect(config).await?)),
        }
    }

    pub fn kind(&self) -> EngineKind {
        match self {
            Engine::Mysql(e) => match e.flavor() {
                MysqlFlavor::Mysql => EngineKind::Mysql,
                MysqlFlavor::MariaDb => EngineKind::MariaDb,
            },
            Engine::Postgres(_) => EngineKind::Postgres,
        }
    }

    pub fn version(&self) -> ServerVersion {
        match self {
            Engine::Mysql(e) => e.version(),
            Engine::Postgres(e) => e.version(),
        }
    }

    pub fn raw_version(&self) -> &str {
        match self {
            Engine::Mysql(e) => e.raw_version(),
            Engine::Postgres(e) => e.raw_version(),
        }
    }

    pub async fn ping(&self) -> Result<()> {
        match self {
            Engine::Mysql(e) => e.ping().await,
            Engine::Postgres(e) => e.ping().await,
        }
    }
}

#[async_trait]
impl DataProvider for Engine {
    async fn keys_in_range(
        &self,
        table: &str,
        key_fields: &[String],
        lower: Option<&KeyTuple>,
        upper: Option<&KeyTuple>,
    ) -> Result<Vec<KeyTuple>> {
        match self {
            Engine::Mysql(e) => e.keys_in_range(table, key_fields, lower, upper).await,
            Engine::Postgres(e) => e.keys_in_range(table, key_fields, lower, upper).await,
        }
    }

    async fn greatest_key_at_limit(
        &self,
        table: &str,
        key_fields: &[String],
        limit: usize,
        offset: Option<&KeyTuple>,
    ) -> Result<Option<KeyTuple>> {
        match self {
            Engine::Mysql(e) => e.greatest_key_at_limit(table, key_fields, limit, offset).await,
            Engine::Postgres(e) => e.greatest_key_at_limit(table, key_fields, limit, offset).await,
        }
    }

    async fn row_count_in_range(
        &self,
        table: &str,
        key_fields: &[String],
        lower: Option<&KeyTuple>,
        upper: Option<&KeyTuple>,
    ) -> Result<u64> {
        match self {
            Engine::Mysql(e) => e.row_count_in_range(table, key_fields, lower, upper).await,
            Engine::Postgres(e) => e.row_count_in_range(table, key_fields, lower, upper).await,
        }
    }

    async fn hashed_values_for_keys(
        &self,
        table: &str,
        key_fields: &[String],
        value_fields: &[String],
        keys: &[KeyTuple],
    ) -> Result<FingerprintMap> {
        match self {
            Engine::Mysql(e) => {
                e.hashed_values_for_keys(table, key_fields, value_fields, keys)
                    .await
            }
            Engine::Postgres(e) => {
                e.hashed_values_for_keys(table, key_fields, value_fields, keys)
                    .await
            }
        }
    }

    fn rows_for_keys<'a>(&'a self, table: &'a Table, keys: &'a [KeyTuple]) -> RowStream<'a> {
        match self {
            Engine::Mysql(e) => e.rows_for_keys(table, keys),
            Engine::Postgres(e) => e.rows_for_keys(table, keys),
        }
    }
}

#[async_trait]
impl TableProvider for Engine {
    async fn current_database(&self) -> Result<String> {
        match self {
            Engine::Mysql(e) => e.current_database().await,
            Engine::Postgres(e) => e.current_database().await,
        }
    }

    async fn table_names(&self) -> Result<Vec<String>> {
        match self {
            Engine::Mysql(e) => e.table_names().await,
            Engine::Postgres(e) => e.table_names().await,
        }
    }

    async fn columns(&self, table: &str) -> Result<Vec<Column>> {
        match self {
            Engine::Mysql(e) => e.columns(table).await,
            Engine::Postgres(e) => e.columns(table).await,
        }
    }

    async fn primary_key(&self, table: &str) -> Result<Vec<String>> {
        match self {
            Engine::Mysql(e) => e.primary_key(table).await,
            Engine::Postgres(e) => e.primary_key(table).await,
        }
    }

    async fn foreign_keys(&self, table: &str) -> Result<Vec<ForeignKey>> {
        match self {
            Engine::Mysql(e) => e.foreign_keys(table).await,
            Engine::Postgres(e) => e.foreign_keys(table).await,
        }
    }
}

#[async_trait]
impl StatementExecutor for Engine {
    async fn execute(&self, sql: &str) -> Result<u64> {
        match self {
            Engine::Mysql(e) => e.execute(sql).await,
            Engine::Postgres(e) => e.execute(sql).await,
        }
    }
}

impl DbEngine for Engine {
    fn dialect(&self) -> &dyn Dialect {
        match self {
            Engine::Mysql(e) => e.dialect(),
            Engine::Postgres(e) => e.dialect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_kind_parsing() {
        assert_eq!(EngineKind::parse("MySQL").unwrap(), EngineKind::Mysql);
        assert_eq!(EngineKind::parse("maria").unwrap(), EngineKind::MariaDb);
        assert_eq!(EngineKind::parse("postgresql").unwrap(), EngineKind::Postgres);
        assert_eq!(EngineKind::parse("pg").unwrap(), EngineKind::Postgres);
        assert!(EngineKind::parse("mssql").is_err());
    }

    #[test]
    fn test_engine_kind_defaults() {
        assert_eq!(EngineKind::Mysql.default_port(), 3306);
        assert_eq!(EngineKind::Postgres.default_port(), 5432);
        assert_eq!(EngineKind::MariaDb.default_ssl_mode(), "prefer");
        assert_eq!(EngineKind::Postgres.to_string(), "postgres");
    }
}
