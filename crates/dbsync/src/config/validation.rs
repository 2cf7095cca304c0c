//! Configuration validation.

use super::{Config, ConnectionConfig};
use crate::drivers::SslMode;
use crate::error::{Result, SyncError};

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    validate_connection("source", &config.source)?;
    validate_connection("destination", &config.destination)?;

    // Same server, database and schema on both sides.
    if config.source.host == config.destination.host
        && config.source.effective_port() == config.destination.effective_port()
        && config.source.database == config.destination.database
        && config.source.effective_schema() == config.destination.effective_schema()
    {
        return Err(SyncError::Config(
            "source and destination cannot be the same database".into(),
        ));
    }

    if config.sync.window_size == 0 {
        return Err(SyncError::Config(
            "sync.window_size must be at least 1".into(),
        ));
    }

    Ok(())
}

fn validate_connection(name: &str, conn: &ConnectionConfig) -> Result<()> {
    conn.kind()
        .map_err(|e| SyncError::Config(format!("{}.type: {}", name, e)))?;
    if conn.host.is_empty() {
        return Err(SyncError::Config(format!("{}.host is required", name)));
    }
    if conn.database.is_empty() {
        return Err(SyncError::Config(format!("{}.database is required", name)));
    }
    if conn.user.is_empty() {
        return Err(SyncError::Config(format!("{}.user is required", name)));
    }
    SslMode::parse(&conn.effective_ssl_mode())
        .map_err(|e| SyncError::Config(format!("{}.ssl_mode: {}", name, e)))?;
    if conn.max_connections < 2 {
        return Err(SyncError::Config(format!(
            "{}.max_connections must be at least 2",
            name
        )));
    }
    Ok(())
}
