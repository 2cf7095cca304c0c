//! PostgreSQL database driver.
//!
//! This module provides PostgreSQL-specific implementations for:
//! - [`PostgresDialect`]: SQL syntax strategy and statement factory
//! - [`PostgresEngine`]: data provider, catalog and statement executor on a
//!   deadpool-postgres pool
//!
//! Key values are inlined as literals (see [`crate::sql::params`]). As with
//! MySQL, statements run on one pinned session connection so the
//! `session_replication_role` hook covers every write.

mod catalog;
mod dialect;
mod provider;

pub use dialect::{PostgresDialect, POSTGRES_MIN_VERSION};

use async_trait::async_trait;
use deadpool_postgres::{Manager, ManagerConfig, Object, Pool, RecyclingMethod};
use tokio::sync::Mutex;
use tokio_postgres::{Config as PgConfig, SimpleQueryMessage};
use tracing::{debug, info, warn};

use crate::config::ConnectionConfig;
use crate::core::traits::{DbEngine, Dialect, StatementExecutor};
use crate::drivers::common::{ServerVersion, SslMode, TlsBuilder};
use crate::error::{Result, SyncError};

/// PostgreSQL engine handle.
pub struct PostgresEngine {
    pool: Pool,
    dialect: PostgresDialect,
    session: Mutex<Option<Object>>,
    version: ServerVersion,
    raw_version: String,
}

impl PostgresEngine {
    /// Connect, verify the server version, and build the engine.
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        let ssl_mode = SslMode::parse(&config.effective_ssl_mode())?;
        let port = config.effective_port();

        let mut pg_config = PgConfig::new();
        pg_config.host(&config.host);
        pg_config.port(port);
        pg_config.dbname(&config.database);
        pg_config.user(&config.user);
        pg_config.password(&config.password);
        pg_config.ssl_mode(ssl_mode.to_postgres());

        let mgr_config = ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        };

        let pool = match TlsBuilder::new(ssl_mode).build()? {
            None => {
                warn!("PostgreSQL TLS is disabled. Credentials will be transmitted in plaintext.");
                let mgr = Manager::from_config(pg_config, tokio_postgres::NoTls, mgr_config);
                Pool::builder(mgr)
                    .max_size(config.max_connections)
                    .build()
                    .map_err(|e| SyncError::pool(e, "creating PostgreSQL pool"))?
            }
            Some(tls_connector) => {
                let mgr = Manager::from_config(pg_config, tls_connector, mgr_config);
                Pool::builder(mgr)
                    .max_size(config.max_connections)
                    .build()
                    .map_err(|e| SyncError::pool(e, "creating PostgreSQL pool"))?
            }
        };

        let client = pool
            .get()
            .await
            .map_err(|e| SyncError::pool(e, "testing PostgreSQL connection"))?;
        let raw_version: String = client
            .query_one("SHOW server_version", &[])
            .await
            .map_err(|e| SyncError::pool(e, "reading PostgreSQL server version"))?
            .get(0);
        drop(client);

        let dialect = PostgresDialect::new(config.effective_schema());
        let version = dialect.check_version(&raw_version)?;

        info!(
            "Connected to postgres {}: {}:{}/{} (schema {})",
            version,
            config.host,
            port,
            config.database,
            dialect.schema()
        );

        Ok(Self {
            pool,
            dialect,
            session: Mutex::new(None),
            version,
            raw_version,
        })
    }

    pub fn version(&self) -> ServerVersion {
        self.version
    }

    pub fn raw_version(&self) -> &str {
        &self.raw_version
    }

    /// Test the database connection.
    pub async fn ping(&self) -> Result<()> {
        let client = self.client("testing PostgreSQL connection").await?;
        client
            .simple_query("SELECT 1")
            .await
            .map_err(|e| SyncError::pool(e, "testing PostgreSQL connection"))?;
        Ok(())
    }

    /// Pooled read connection.
    pub(crate) async fn client(&self, context: &str) -> Result<Object> {
        self.pool
            .get()
            .await
            .map_err(|e| SyncError::pool(e, context.to_string()))
    }
}

#[async_trait]
impl StatementExecutor for PostgresEngine {
    async fn execute(&self, sql: &str) -> Result<u64> {
        let mut session = self.session.lock().await;
        if session.is_none() {
            let conn = self.client("acquiring PostgreSQL session connection").await?;
            debug!("Pinned PostgreSQL session connection for statement execution");
            *session = Some(conn);
        }
        let conn = session
            .as_ref()
            .ok_or_else(|| SyncError::pool("no session connection", "executing statement"))?;

        // Simple protocol: generated statements carry literals, never binds.
        let messages = match conn.simple_query(sql).await {
            Ok(messages) => messages,
            Err(e) => {
                let err = SyncError::from(e);
                if err.is_connection_error() {
                    warn!("PostgreSQL session connection lost, releasing it: {}", err);
                    *session = None;
                    return Err(SyncError::pool(err, "executing statement on PostgreSQL session"));
                }
                return Err(err);
            }
        };
        let affected = messages
            .iter()
            .map(|m| match m {
                SimpleQueryMessage::CommandComplete(n) => *n,
                _ => 0,
            })
            .sum();
        Ok(affected)
    }
}

impl DbEngine for PostgresEngine {
    fn dialect(&self) -> &dyn Dialect {
        &self.dialect
    }
}
