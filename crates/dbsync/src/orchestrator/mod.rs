//! Sync orchestrator - multi-table workflow coordinator.
//!
//! Connects both engines, resolves the table list and runs one
//! [`TableSync`] per table, one table at a time. Tables are independent:
//! with `continue_on_error` a failed table is recorded and the run moves on.

use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::{Config, SyncConfig, SyncMode};
use crate::core::schema::Table;
use crate::core::traits::{DbEngine, TableProvider};
use crate::drivers::Engine;
use crate::error::{Result, SyncError};
use crate::sync::{TableSync, TableSyncResult};

/// Sync orchestrator.
pub struct Orchestrator {
    config: Config,
    source: Engine,
    destination: Engine,
}

/// Outcome of one table within a run.
#[derive(Debug, Clone, Serialize)]
pub struct TableOutcome {
    pub table: String,

    /// "completed", "failed" or "cancelled".
    pub status: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<TableSyncResult>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Result of a sync run.
#[derive(Debug, Clone, Serialize)]
pub struct SyncRunResult {
    /// Unique run identifier.
    pub run_id: String,

    /// Hash of the configuration the run used.
    pub config_hash: String,

    /// "execute" or "generate".
    pub mode: String,

    /// Final status: completed, failed or cancelled.
    pub status: String,

    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,

    /// Total duration in seconds.
    pub duration_seconds: f64,

    pub tables_total: usize,
    pub tables_success: usize,
    pub tables_failed: usize,

    pub rows_deleted: u64,
    pub rows_inserted: u64,
    pub rows_updated: u64,

    /// List of failed table names.
    pub failed_tables: Vec<String>,

    pub tables: Vec<TableOutcome>,

    /// Generated statements, in order (generate mode only).
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub statements: Vec<String>,
}

impl SyncRunResult {
    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Whether every table completed.
    pub fn is_success(&self) -> bool {
        self.status == "completed"
    }
}

/// Connectivity report for both sides.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckResult {
    pub source_connected: bool,
    pub source_latency_ms: u64,
    pub source_version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_error: Option<String>,
    pub destination_connected: bool,
    pub destination_latency_ms: u64,
    pub destination_version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination_error: Option<String>,
    pub healthy: bool,
}

/// A table name with its primary key, as listed by `tables`.
#[derive(Debug, Clone, Serialize)]
pub struct TableSummary {
    pub name: String,
    pub primary_key: Vec<String>,
}

impl Orchestrator {
    /// Create a new orchestrator, connecting both sides.
    pub async fn new(config: Config) -> Result<Self> {
        let (source, destination) = tokio::try_join!(
            Engine::connect(&config.source),
            Engine::connect(&config.destination),
        )?;
        info!(
            "Source: {} {}, destination: {} {}",
            source.kind(),
            source.raw_version(),
            destination.kind(),
            destination.raw_version()
        );
        Ok(Self {
            config,
            source,
            destination,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Tables the run will visit.
    pub async fn plan_tables(&self) -> Result<Vec<String>> {
        plan_tables(&self.config.sync, &self.source).await
    }

    /// Every source table with its primary key.
    pub async fn list_tables(&self) -> Result<Vec<TableSummary>> {
        let mut out = Vec::new();
        for name in self.source.table_names().await? {
            let primary_key = self.source.primary_key(&name).await?;
            out.push(TableSummary { name, primary_key });
        }
        Ok(out)
    }

    /// Descriptors of `table` on the source and destination.
    pub async fn describe(&self, table: &str) -> Result<(Table, Table)> {
        tokio::try_join!(self.source.table(table), self.destination.table(table))
    }

    /// Run the sync.
    ///
    /// `tables` overrides the planned table list; `dry_run` forces generate mode.
    pub async fn run(
        &self,
        cancel: CancellationToken,
        tables: Option<Vec<String>>,
        dry_run: bool,
    ) -> Result<SyncRunResult> {
        let tables = match tables {
            Some(tables) if !tables.is_empty() => tables,
            _ => self.plan_tables().await?,
        };
        let mut sync = self.config.sync.clone();
        if dry_run {
            sync.mode = SyncMode::Generate;
        }
        run_tables(
            &sync,
            &self.config.hash(),
            &self.source,
            &self.destination,
            &tables,
            cancel,
        )
        .await
    }

    /// Ping both sides and report latency and version.
    pub async fn health_check(&self) -> Result<HealthCheckResult> {
        let started = Instant::now();
        let source = self.source.ping().await;
        let source_latency_ms = started.elapsed().as_millis() as u64;

        let started = Instant::now();
        let destination = self.destination.ping().await;
        let destination_latency_ms = started.elapsed().as_millis() as u64;

        Ok(HealthCheckResult {
            source_connected: source.is_ok(),
            source_latency_ms,
            source_version: self.source.raw_version().to_string(),
            source_error: source.as_ref().err().map(|e| e.to_string()),
            destination_connected: destination.is_ok(),
            destination_latency_ms,
            destination_version: self.destination.raw_version().to_string(),
            destination_error: destination.as_ref().err().map(|e| e.to_string()),
            healthy: source.is_ok() && destination.is_ok(),
        })
    }
}

/// Configured tables, or every source table, minus exclusions.
pub(crate) async fn plan_tables<P: TableProvider + ?Sized>(
    sync: &SyncConfig,
    source: &P,
) -> Result<Vec<String>> {
    let candidates = if sync.tables.is_empty() {
        source.table_names().await?
    } else {
        sync.tables.clone()
    };
    let tables: Vec<String> = candidates.into_iter().filter(|t| sync.includes(t)).collect();
    info!("Found {} tables to sync", tables.len());
    Ok(tables)
}

/// Sync `tables` one after another.
pub(crate) async fn run_tables<S, D>(
    sync: &SyncConfig,
    config_hash: &str,
    source: &S,
    destination: &D,
    tables: &[String],
    cancel: CancellationToken,
) -> Result<SyncRunResult>
where
    S: DbEngine + ?Sized,
    D: DbEngine + ?Sized,
{
    let started_at = Utc::now();
    let run_id = uuid::Uuid::new_v4().to_string();
    info!("Starting sync run: {} ({} mode)", run_id, sync.mode);

    let table_sync = TableSync::new()
        .with_window_size(sync.window_size)
        .with_hooks(sync.disable_integrity_checks)
        .with_cancellation(cancel.clone());

    let mut outcomes = Vec::with_capacity(tables.len());
    let mut statements = Vec::new();
    let mut fatal: Option<SyncError> = None;
    let mut cancelled = false;

    for name in tables {
        if cancel.is_cancelled() {
            info!("Cancellation requested, skipping remaining tables");
            cancelled = true;
            break;
        }

        let result = sync_one(&table_sync, sync.mode, name, source, destination).await;
        match result {
            Ok((stats, generated)) => {
                statements.extend(generated);
                outcomes.push(TableOutcome {
                    table: name.clone(),
                    status: "completed".to_string(),
                    stats: Some(stats),
                    error: None,
                });
            }
            Err(SyncError::Cancelled) => {
                warn!("{}: cancelled", name);
                outcomes.push(TableOutcome {
                    table: name.clone(),
                    status: "cancelled".to_string(),
                    stats: None,
                    error: None,
                });
                cancelled = true;
                break;
            }
            Err(e) => {
                error!("{}: {}", name, e);
                outcomes.push(TableOutcome {
                    table: name.clone(),
                    status: "failed".to_string(),
                    stats: None,
                    error: Some(e.to_string()),
                });
                if !sync.continue_on_error {
                    fatal = Some(e);
                    break;
                }
            }
        }
    }

    let completed_at = Utc::now();
    let duration_seconds = (completed_at - started_at).num_milliseconds() as f64 / 1000.0;
    let failed_tables: Vec<String> = outcomes
        .iter()
        .filter(|o| o.status == "failed")
        .map(|o| o.table.clone())
        .collect();
    let stats: Vec<&TableSyncResult> = outcomes.iter().filter_map(|o| o.stats.as_ref()).collect();
    let tables_success = stats.len();
    let rows_deleted: u64 = stats.iter().map(|s| s.deletes).sum();
    let rows_inserted: u64 = stats.iter().map(|s| s.inserts).sum();
    let rows_updated: u64 = stats.iter().map(|s| s.updates).sum();

    let status = if !failed_tables.is_empty() {
        "failed"
    } else if cancelled {
        "cancelled"
    } else {
        "completed"
    };

    let result = SyncRunResult {
        run_id,
        config_hash: config_hash.to_string(),
        mode: sync.mode.to_string(),
        status: status.to_string(),
        started_at,
        completed_at,
        duration_seconds,
        tables_total: tables.len(),
        tables_success,
        tables_failed: failed_tables.len(),
        rows_deleted,
        rows_inserted,
        rows_updated,
        failed_tables,
        tables: outcomes,
        statements,
    };

    info!(
        "Sync {}: {} tables, {} deletes, {} inserts, {} updates in {:.1}s",
        result.status,
        result.tables_total,
        result.rows_deleted,
        result.rows_inserted,
        result.rows_updated,
        result.duration_seconds
    );

    match fatal {
        Some(e) => Err(e),
        None => Ok(result),
    }
}

async fn sync_one<S, D>(
    table_sync: &TableSync,
    mode: SyncMode,
    name: &str,
    source: &S,
    destination: &D,
) -> Result<(TableSyncResult, Vec<String>)>
where
    S: DbEngine + ?Sized,
    D: DbEngine + ?Sized,
{
    let table = source.table(name).await?;
    if destination.columns(name).await?.is_empty() {
        return Err(SyncError::Config(format!(
            "table {} does not exist on the destination",
            name
        )));
    }

    match mode {
        SyncMode::Execute => Ok((table_sync.sync_table(&table, source, destination).await?, Vec::new())),
        SyncMode::Generate => {
            let (stats, statements) = table_sync
                .generate_statements(&table, source, destination)
                .await?;
            Ok((stats, statements.into_iter().map(|s| s.sql).collect()))
        }
    }
}
