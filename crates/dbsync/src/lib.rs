//! # dbsync
//!
//! Chunked table synchronization between two database connections.
//!
//! The destination is brought in line with the source one key window at a
//! time:
//!
//! - **Keyset windows** sized so neither side returns more than a fixed
//!   number of rows, even when one side is much denser
//! - **Server-side fingerprints** so only rows that actually differ are
//!   transferred
//! - **Field-level updates** that touch only the columns that changed
//! - **Execute or generate**: apply statements directly, or collect them
//!   for review
//!
//! MySQL, MariaDB and PostgreSQL are supported on either side.
//!
//! ## Example
//!
//! ```rust,no_run
//! use dbsync::{Config, Orchestrator};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let orchestrator = Orchestrator::new(config).await?;
//!     let result = orchestrator.run(CancellationToken::new(), None, false).await?;
//!     println!("Updated {} rows", result.rows_updated);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod core;
pub mod drivers;
pub mod error;
pub mod orchestrator;
pub mod sql;
pub mod sync;

// Re-exports for convenient access
pub use config::{Config, ConnectionConfig, SyncConfig, SyncMode};
pub use crate::core::{Column, ForeignKey, KeyTuple, KeyValue, Row, SqlValue, Table};
pub use drivers::{Engine, EngineKind};
pub use error::{Result, SyncError};
pub use orchestrator::{HealthCheckResult, Orchestrator, SyncRunResult, TableOutcome, TableSummary};
pub use sync::{Change, ChangeSink, Intent, Statement, TableSync, TableSyncResult};
