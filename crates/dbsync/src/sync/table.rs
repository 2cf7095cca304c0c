//! Per-table synchronization state machine.
//!
//! One table sync walks the key space in windows:
//!
//! ```text
//! Idle -> Scanning(offset) -> deletes -> inserts -> updates -> Scanning(upper) -> ... -> Done
//! ```
//!
//! Every mutation goes through a [`ChangeSink`]. The destination's set-up
//! hook is issued lazily right before the first mutation, and its
//! tear-down hook exactly once on every exit path after that.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use futures::{StreamExt, TryStreamExt};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::change::{Change, ChangeSink, CollectingSink, ExecutingSink, Intent, Statement};
use super::compare::{
    field_delta, full_delta, get_keys_with_differences_in_values, partition_keys,
};
use super::window::find_nearest_upper_bound_with_max_n_rows;
use crate::core::key::KeyTuple;
use crate::core::schema::Table;
use crate::core::traits::{DataProvider, DbEngine, Dialect, RowStream};
use crate::core::value::Row;
use crate::error::{Result, SyncError};

/// Target row count per window.
pub const DEFAULT_WINDOW_SIZE: usize = 1000;

/// Which connection a key was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// Source.
    Local,
    /// Destination.
    Remote,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Local => "local",
            Side::Remote => "remote",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caller-supplied predicate; `false` hides the key on that side.
pub type RowFilter = Arc<dyn Fn(Side, &str, &KeyTuple) -> bool + Send + Sync>;

/// Statistics of one table sync.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TableSyncResult {
    pub table: String,
    pub windows: u64,
    pub deletes: u64,
    pub inserts: u64,
    pub updates: u64,
    pub insert_failures: u64,
    /// Updates sent with every non-key field because no single field differed.
    pub fingerprint_fallbacks: u64,
    /// Differing rows that vanished from one side before they could be fetched.
    pub skipped_updates: u64,
    pub duration_ms: u64,
}

impl TableSyncResult {
    fn new(table: &str) -> Self {
        Self {
            table: table.to_string(),
            ..Self::default()
        }
    }

    /// Mutations emitted (deletes, inserts and updates).
    pub fn changes(&self) -> u64 {
        self.deletes + self.inserts + self.updates
    }
}

/// Table sync settings.
#[derive(Clone)]
pub struct TableSync {
    window_size: usize,
    run_hooks: bool,
    filter: Option<RowFilter>,
    cancel: CancellationToken,
}

impl Default for TableSync {
    fn default() -> Self {
        Self {
            window_size: DEFAULT_WINDOW_SIZE,
            run_hooks: true,
            filter: None,
            cancel: CancellationToken::new(),
        }
    }
}

impl TableSync {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_window_size(mut self, window_size: usize) -> Self {
        self.window_size = window_size.max(1);
        self
    }

    /// Whether the destination's set-up/tear-down hooks are issued.
    pub fn with_hooks(mut self, run_hooks: bool) -> Self {
        self.run_hooks = run_hooks;
        self
    }

    pub fn with_filter(mut self, filter: RowFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Stop before the next window once `cancel` fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Sync `table` and apply every statement to `dest` as it is produced.
    pub async fn sync_table<S, D>(&self, table: &Table, source: &S, dest: &D) -> Result<TableSyncResult>
    where
        S: DataProvider + ?Sized,
        D: DbEngine + ?Sized,
    {
        let mut sink = ExecutingSink::new(dest);
        self.project_changes(table, source, dest, &mut sink).await
    }

    /// Sync `table` without touching `dest`, returning the statements that
    /// would have been applied.
    pub async fn generate_statements<S, D>(
        &self,
        table: &Table,
        source: &S,
        dest: &D,
    ) -> Result<(TableSyncResult, Vec<Statement>)>
    where
        S: DataProvider + ?Sized,
        D: DbEngine + ?Sized,
    {
        let mut sink = CollectingSink::new();
        let result = self.project_changes(table, source, dest, &mut sink).await?;
        Ok((result, sink.into_statements()))
    }

    /// Compare `table` on both sides and feed the resulting change records
    /// to `sink`. Statements are built with the destination's dialect.
    pub async fn project_changes<S, D, K>(
        &self,
        table: &Table,
        source: &S,
        dest: &D,
        sink: &mut K,
    ) -> Result<TableSyncResult>
    where
        S: DataProvider + ?Sized,
        D: DbEngine + ?Sized,
        K: ChangeSink + ?Sized,
    {
        table.validate()?;
        let started = Instant::now();
        let mut emitter = Emitter {
            table,
            dialect: dest.dialect(),
            sink,
            run_hooks: self.run_hooks,
            set_up_done: false,
        };
        let mut result = TableSyncResult::new(&table.name);

        let outcome = self.scan(table, source, dest, &mut emitter, &mut result).await;
        let tear_down = emitter.tear_down().await;
        result.duration_ms = started.elapsed().as_millis() as u64;

        match (outcome, tear_down) {
            (Ok(()), Ok(())) => {
                info!(
                    "{}: {} windows, {} deletes, {} inserts, {} updates in {}ms",
                    table.name,
                    result.windows,
                    result.deletes,
                    result.inserts,
                    result.updates,
                    result.duration_ms
                );
                Ok(result)
            }
            (Ok(()), Err(e)) => Err(e),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(tear_down_error)) => {
                error!("{}: tear-down failed after error: {}", table.name, tear_down_error);
                Err(e)
            }
        }
    }

    async fn scan<S, D, K>(
        &self,
        table: &Table,
        source: &S,
        dest: &D,
        emitter: &mut Emitter<'_, K>,
        result: &mut TableSyncResult,
    ) -> Result<()>
    where
        S: DataProvider + ?Sized,
        D: DbEngine + ?Sized,
        K: ChangeSink + ?Sized,
    {
        let (key_fields, value_fields) = table.key_and_value_fields();
        let name = table.name.as_str();
        let mut offset: Option<KeyTuple> = None;

        loop {
            if self.cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }
            if let Some(offset) = &offset {
                info!(table = %name, "{} / Offset: {}", name, offset);
            }

            let Some(upper) = find_nearest_upper_bound_with_max_n_rows(
                source,
                dest,
                name,
                &key_fields,
                self.window_size,
                offset.as_ref(),
            )
            .await?
            else {
                break;
            };
            result.windows += 1;

            let (local, remote) = tokio::try_join!(
                source.keys_in_range(name, &key_fields, offset.as_ref(), Some(&upper)),
                dest.keys_in_range(name, &key_fields, offset.as_ref(), Some(&upper)),
            )?;
            let local = self.filter_keys(Side::Local, name, local);
            let remote = self.filter_keys(Side::Remote, name, remote);
            let partition = partition_keys(&local, &remote);
            debug!(
                "{}: window up to {}: {} to delete, {} to insert, {} to compare",
                name,
                upper,
                partition.source_missing.len(),
                partition.dest_missing.len(),
                partition.common.len()
            );

            for key in &partition.source_missing {
                emitter
                    .log(format!("{} / Remove from dest: {}", name, key))
                    .await?;
                let sql = emitter.dialect.make_delete(table, key)?;
                emitter.mutate(Intent::Delete { key: key.clone() }, sql).await?;
                result.deletes += 1;
            }

            if !partition.dest_missing.is_empty() {
                emitter.ensure_set_up().await?;
                let mut rows = source.rows_for_keys(table, &partition.dest_missing);
                while let Some(item) = rows.next().await {
                    let (_, row) = item?;
                    match emitter.insert(row).await {
                        Ok(()) => result.inserts += 1,
                        Err(e) if e.is_row_level() => {
                            error!(table = %name, "{}", e);
                            result.insert_failures += 1;
                        }
                        Err(e) => return Err(e),
                    }
                }
            }

            if !partition.common.is_empty() {
                let (a, b) = tokio::try_join!(
                    source.hashed_values_for_keys(name, &key_fields, &value_fields, &partition.common),
                    dest.hashed_values_for_keys(name, &key_fields, &value_fields, &partition.common),
                )?;
                let differing = get_keys_with_differences_in_values(&a, &b);
                if !differing.is_empty() {
                    let (source_rows, dest_rows) = tokio::try_join!(
                        collect_rows(source.rows_for_keys(table, &differing)),
                        collect_rows(dest.rows_for_keys(table, &differing)),
                    )?;
                    let dest_rows: HashMap<String, Row> = dest_rows.into_iter().collect();

                    for (key_hash, row) in source_rows {
                        let Some(dest_row) = dest_rows.get(&key_hash) else {
                            warn!("{} / {}: row vanished from destination, skipping update", name, key_hash);
                            result.skipped_updates += 1;
                            continue;
                        };
                        let mut delta = field_delta(&value_fields, dest_row, &row);
                        if delta.is_empty() {
                            warn!(
                                "{} / {}: fingerprints differ but no field does, sending every non-key field",
                                name, key_hash
                            );
                            result.fingerprint_fallbacks += 1;
                            delta = full_delta(&value_fields, dest_row, &row);
                        }
                        let values = delta.values();
                        let key = row.key(&key_fields)?;

                        emitter
                            .log(format!("{} / {}: {}", name, key_hash, delta.summary()))
                            .await?;
                        let sql = emitter.dialect.make_update(table, &values, &key)?;
                        emitter.mutate(Intent::Update { values, key }, sql).await?;
                        result.updates += 1;
                    }
                }
            }

            offset = Some(upper);
        }

        Ok(())
    }

    fn filter_keys(&self, side: Side, table: &str, keys: Vec<KeyTuple>) -> Vec<KeyTuple> {
        match &self.filter {
            Some(filter) => keys.into_iter().filter(|k| filter(side, table, k)).collect(),
            None => keys,
        }
    }
}

async fn collect_rows(rows: RowStream<'_>) -> Result<Vec<(String, Row)>> {
    rows.try_collect().await
}

/// Routes change records to the sink and tracks the hook state.
struct Emitter<'a, K: ChangeSink + ?Sized> {
    table: &'a Table,
    dialect: &'a dyn Dialect,
    sink: &'a mut K,
    run_hooks: bool,
    set_up_done: bool,
}

impl<'a, K: ChangeSink + ?Sized> Emitter<'a, K> {
    async fn log(&mut self, message: String) -> Result<()> {
        self.sink.accept(Change::log(&self.table.name, message)).await
    }

    async fn ensure_set_up(&mut self) -> Result<()> {
        if self.set_up_done {
            return Ok(());
        }
        // Partially applied hooks still need their tear-down.
        self.set_up_done = true;
        if self.run_hooks {
            for sql in self.dialect.set_up() {
                self.sink
                    .accept(Change::statement(&self.table.name, Intent::SetUp, sql))
                    .await
                    .map_err(|e| SyncError::query(&self.table.name, format!("set-up failed: {}", e)))?;
            }
        }
        Ok(())
    }

    async fn mutate(&mut self, intent: Intent, sql: String) -> Result<()> {
        self.ensure_set_up().await?;
        self.sink
            .accept(Change::statement(&self.table.name, intent, sql))
            .await
    }

    async fn insert(&mut self, row: Row) -> Result<()> {
        let key = self.table.only_primary_keys(&row);
        self.log(format!(
            "{} / Add to dest: {}",
            self.table.name,
            key.to_json_string()
        ))
        .await?;
        let sql = self.dialect.make_insert(self.table, &row)?;
        self.mutate(Intent::Insert { row }, sql).await
    }

    async fn tear_down(&mut self) -> Result<()> {
        if !self.set_up_done || !self.run_hooks {
            return Ok(());
        }
        for sql in self.dialect.tear_down() {
            self.sink
                .accept(Change::statement(&self.table.name, Intent::TearDown, sql))
                .await?;
        }
        Ok(())
    }
}
