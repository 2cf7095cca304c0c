//! Error types for the sync library.

use thiserror::Error;

/// Process exit codes used by the CLI.
pub const EXIT_CONFIG_ERROR: u8 = 1;
pub const EXIT_CONNECTION_ERROR: u8 = 2;
pub const EXIT_QUERY_ERROR: u8 = 3;
pub const EXIT_INCONSISTENT_WINDOW: u8 = 4;
pub const EXIT_IO_ERROR: u8 = 7;
pub const EXIT_CANCELLED: u8 = 130;

/// Main error type for sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Configuration error (invalid YAML, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Server version is unparsable or below the supported minimum
    #[error("Unsupported {engine} version '{version}': {reason}")]
    UnsupportedVersion {
        engine: String,
        version: String,
        reason: String,
    },

    /// Table has no primary key, so it cannot be paginated or hashed
    #[error("Table {0} has no primary key - keyset synchronization requires one")]
    NoPrimaryKey(String),

    /// Connection pool error with context
    #[error("Pool error: {message}\n  Context: {context}")]
    Pool { message: String, context: String },

    /// Scan, count, hash or catalog query failed
    #[error("Query failed for table {table}: {message}")]
    Query { table: String, message: String },

    /// A single statement could not be applied to the destination
    #[error("Write failed for table {table}: {message}")]
    Write { table: String, message: String },

    /// The window finder could not make progress although rows remain
    #[error(
        "Inconsistent window for table {table}: no upper bound after offset {offset} \
         but {source_rows} source / {dest_rows} destination rows remain"
    )]
    InconsistentWindow {
        table: String,
        offset: String,
        source_rows: u64,
        dest_rows: u64,
    },

    /// MySQL / MariaDB driver error
    #[error("MySQL error: {0}")]
    Mysql(#[from] sqlx::Error),

    /// PostgreSQL driver error
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Sync was cancelled (SIGINT, etc.)
    #[error("Sync cancelled")]
    Cancelled,
}

impl SyncError {
    /// Create a Pool error with context about where it occurred
    pub fn pool(message: impl ToString, context: impl Into<String>) -> Self {
        SyncError::Pool {
            message: message.to_string(),
            context: context.into(),
        }
    }

    /// Create a Query error
    pub fn query(table: impl Into<String>, message: impl ToString) -> Self {
        SyncError::Query {
            table: table.into(),
            message: message.to_string(),
        }
    }

    /// Create a Write error
    pub fn write(table: impl Into<String>, message: impl ToString) -> Self {
        SyncError::Write {
            table: table.into(),
            message: message.to_string(),
        }
    }

    /// Whether the error only affects a single statement.
    pub fn is_row_level(&self) -> bool {
        matches!(self, SyncError::Write { .. })
    }

    /// Whether the connection itself failed, as opposed to the statement.
    pub fn is_connection_error(&self) -> bool {
        match self {
            SyncError::Pool { .. } => true,
            SyncError::Mysql(e) => matches!(
                e,
                sqlx::Error::Io(_)
                    | sqlx::Error::Tls(_)
                    | sqlx::Error::Protocol(_)
                    | sqlx::Error::PoolClosed
                    | sqlx::Error::PoolTimedOut
                    | sqlx::Error::WorkerCrashed
            ),
            // Anything the server did not answer with a database error is transport.
            SyncError::Postgres(e) => e.is_closed() || e.as_db_error().is_none(),
            _ => false,
        }
    }

    /// Map the error class to a process exit code.
    pub fn exit_code(&self) -> u8 {
        match self {
            SyncError::Config(_)
            | SyncError::UnsupportedVersion { .. }
            | SyncError::NoPrimaryKey(_)
            | SyncError::Yaml(_) => EXIT_CONFIG_ERROR,
            SyncError::Pool { .. } => EXIT_CONNECTION_ERROR,
            SyncError::InconsistentWindow { .. } => EXIT_INCONSISTENT_WINDOW,
            SyncError::Io(_) => EXIT_IO_ERROR,
            SyncError::Cancelled => EXIT_CANCELLED,
            _ => EXIT_QUERY_ERROR,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
