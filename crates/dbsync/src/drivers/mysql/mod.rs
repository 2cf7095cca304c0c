//! MySQL/MariaDB database driver.
//!
//! This module provides MySQL-specific implementations for:
//! - [`MysqlDialect`]: SQL syntax strategy and statement factory
//! - [`MysqlEngine`]: data provider, catalog and statement executor on a
//!   sqlx connection pool
//!
//! # Supported Versions
//!
//! - MySQL 8.0+
//! - MariaDB 10.2.3+
//!
//! # Connections
//!
//! Reads use the pool. Statements are executed on one pinned session
//! connection, so session-level hooks such as `SET FOREIGN_KEY_CHECKS=0`
//! apply to every write of a table sync.

mod catalog;
mod dialect;
mod provider;

pub use dialect::{MysqlDialect, MysqlFlavor, MARIADB_MIN_VERSION, MYSQL_MIN_VERSION};

use std::time::Duration;

use async_trait::async_trait;
use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions};
use sqlx::pool::PoolConnection;
use sqlx::MySql;
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info, warn};

use crate::config::ConnectionConfig;
use crate::core::traits::{DbEngine, Dialect, StatementExecutor};
use crate::drivers::common::{ServerVersion, SslMode};
use crate::error::{Result, SyncError};

/// Connection pool timeout.
const POOL_CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);

/// MySQL/MariaDB engine handle.
pub struct MysqlEngine {
    pool: MySqlPool,
    dialect: MysqlDialect,
    session: Mutex<Option<PoolConnection<MySql>>>,
    database_name: OnceCell<String>,
    version: ServerVersion,
    raw_version: String,
}

impl MysqlEngine {
    /// Connect, verify the server version, and build the engine.
    pub async fn connect(config: &ConnectionConfig, flavor: MysqlFlavor) -> Result<Self> {
        let ssl_mode = SslMode::parse(&config.effective_ssl_mode())?;

        let options = MySqlConnectOptions::new()
            .host(&config.host)
            .port(config.effective_port())
            .database(&config.database)
            .username(&config.user)
            .password(&config.password)
            .ssl_mode(ssl_mode.to_mysql());

        let pool = MySqlPoolOptions::new()
            .max_connections(config.max_connections as u32)
            .acquire_timeout(POOL_CONNECTION_TIMEOUT)
            .connect_with(options)
            .await
            .map_err(|e| SyncError::pool(e, "creating MySQL pool"))?;

        let raw_version: String = sqlx::query_scalar("SELECT VERSION()")
            .fetch_one(&pool)
            .await
            .map_err(|e| SyncError::pool(e, "reading MySQL server version"))?;

        let dialect = MysqlDialect::new(flavor);
        let version = dialect.check_version(&raw_version)?;

        info!(
            "Connected to {} {}: {}:{}/{}",
            dialect.name(),
            version,
            config.host,
            config.effective_port(),
            config.database
        );

        Ok(Self {
            pool,
            dialect,
            session: Mutex::new(None),
            database_name: OnceCell::new(),
            version,
            raw_version,
        })
    }

    pub fn flavor(&self) -> MysqlFlavor {
        self.dialect.flavor()
    }

    pub fn version(&self) -> ServerVersion {
        self.version
    }

    /// Version string as reported by the server.
    pub fn raw_version(&self) -> &str {
        &self.raw_version
    }

    /// Test the database connection.
    pub async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| SyncError::pool(e, "testing MySQL connection"))?;
        Ok(())
    }
}

#[async_trait]
impl StatementExecutor for MysqlEngine {
    async fn execute(&self, sql: &str) -> Result<u64> {
        let mut session = self.session.lock().await;
        if session.is_none() {
            let conn = self
                .pool
                .acquire()
                .await
                .map_err(|e| SyncError::pool(e, "acquiring MySQL session connection"))?;
            debug!("Pinned MySQL session connection for statement execution");
            *session = Some(conn);
        }
        let conn = session
            .as_mut()
            .ok_or_else(|| SyncError::pool("no session connection", "executing statement"))?;

        let conn: &mut sqlx::MySqlConnection = &mut *conn;
        match sqlx::Executor::execute(conn, sqlx::raw_sql(sql)).await {
            Ok(result) => Ok(result.rows_affected()),
            Err(e) => {
                let err = SyncError::from(e);
                if err.is_connection_error() {
                    warn!("MySQL session connection lost, releasing it: {}", err);
                    *session = None;
                    return Err(SyncError::pool(err, "executing statement on MySQL session"));
                }
                Err(err)
            }
        }
    }
}

impl DbEngine for MysqlEngine {
    fn dialect(&self) -> &dyn Dialect {
        &self.dialect
    }
}
