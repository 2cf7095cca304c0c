//! In-memory engine for exercising the sync algorithm without a server.
//!
//! Tables are held as sorted row vectors. Range filtering reuses the same
//! offset conditions the SQL engines render, evaluated in process.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use super::common::chunked_rows;
use super::mysql::MysqlDialect;
use crate::core::key::KeyTuple;
use crate::core::schema::{Column, ForeignKey, Table};
use crate::core::traits::{
    DataProvider, DbEngine, Dialect, Fingerprint, FingerprintMap, RowStream, StatementExecutor,
    TableProvider,
};
use crate::core::value::{Row, SqlValue};
use crate::error::{Result, SyncError};
use crate::sql::condition::range_condition;
use crate::sql::params::ParamStyle;
use crate::sync::change::Intent;

/// MySQL syntax with replaceable set-up and tear-down hooks.
struct MemoryDialect {
    inner: MysqlDialect,
    hooks: Option<(Vec<String>, Vec<String>)>,
}

impl Dialect for MemoryDialect {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn quote_ident(&self, name: &str) -> String {
        self.inner.quote_ident(name)
    }

    fn quote_table(&self, name: &str) -> String {
        self.inner.quote_table(name)
    }

    fn quote_value(&self, value: &SqlValue) -> String {
        self.inner.quote_value(value)
    }

    fn param_style(&self) -> ParamStyle {
        self.inner.param_style()
    }

    fn fingerprint_expr(&self, value_fields: &[String], alias: Option<&str>) -> String {
        self.inner.fingerprint_expr(value_fields, alias)
    }

    fn make_insert(&self, table: &Table, row: &Row) -> Result<String> {
        self.inner.make_insert(table, row)
    }

    fn make_update(&self, table: &Table, values: &Row, key: &KeyTuple) -> Result<String> {
        self.inner.make_update(table, values, key)
    }

    fn make_delete(&self, table: &Table, key: &KeyTuple) -> Result<String> {
        self.inner.make_delete(table, key)
    }

    fn set_up(&self) -> Vec<String> {
        match &self.hooks {
            Some((set_up, _)) => set_up.clone(),
            None => self.inner.set_up(),
        }
    }

    fn tear_down(&self) -> Vec<String> {
        match &self.hooks {
            Some((_, tear_down)) => tear_down.clone(),
            None => self.inner.tear_down(),
        }
    }
}

struct MemoryTable {
    table: Table,
    rows: Vec<Row>,
}

impl MemoryTable {
    fn key(&self, row: &Row) -> Option<KeyTuple> {
        KeyTuple::from_row(row, &self.table.primary_key).ok()
    }

    fn sort(&mut self) {
        let key_fields = self.table.primary_key.clone();
        self.rows
            .sort_by_cached_key(|r| KeyTuple::from_row(r, &key_fields).unwrap_or_default());
    }

    fn position(&self, key: &KeyTuple) -> Option<usize> {
        self.rows
            .iter()
            .position(|r| self.key(r).as_ref() == Some(key))
    }
}

pub(crate) struct MemoryEngine {
    dialect: MemoryDialect,
    database: String,
    tables: Mutex<BTreeMap<String, MemoryTable>>,
    executed: Mutex<Vec<String>>,
    fail_needles: Mutex<Vec<String>>,
    corrupted: Mutex<HashSet<String>>,
    queries: AtomicUsize,
    fail_after: Mutex<Option<usize>>,
    disconnect_after: Mutex<Option<usize>>,
    blind_limit_scan: AtomicBool,
}

impl MemoryEngine {
    pub(crate) fn new(database: &str) -> Self {
        Self {
            dialect: MemoryDialect {
                inner: MysqlDialect::mysql(),
                hooks: None,
            },
            database: database.to_string(),
            tables: Mutex::new(BTreeMap::new()),
            executed: Mutex::new(Vec::new()),
            fail_needles: Mutex::new(Vec::new()),
            corrupted: Mutex::new(HashSet::new()),
            queries: AtomicUsize::new(0),
            fail_after: Mutex::new(None),
            disconnect_after: Mutex::new(None),
            blind_limit_scan: AtomicBool::new(false),
        }
    }

    pub(crate) fn with_table(self, table: Table, rows: Vec<Row>) -> Self {
        let mut entry = MemoryTable { table, rows };
        entry.sort();
        self.tables
            .lock()
            .unwrap()
            .insert(entry.table.name.clone(), entry);
        self
    }

    /// Current rows of `table`, in key order.
    pub(crate) fn rows(&self, table: &str) -> Vec<Row> {
        self.tables
            .lock()
            .unwrap()
            .get(table)
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    /// Statements applied successfully so far.
    pub(crate) fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }

    /// Reject every statement containing `needle` as a single-row failure.
    pub(crate) fn fail_statements_containing(&self, needle: &str) {
        self.fail_needles.lock().unwrap().push(needle.to_string());
    }

    /// Let `n` more data queries succeed, then fail all of them.
    pub(crate) fn fail_queries_after(&self, n: usize) {
        *self.fail_after.lock().unwrap() = Some(self.queries.load(Ordering::SeqCst) + n);
    }

    /// Replace the MySQL set-up and tear-down statements.
    pub(crate) fn with_hooks<I, J>(mut self, set_up: I, tear_down: J) -> Self
    where
        I: IntoIterator<Item = &'static str>,
        J: IntoIterator<Item = &'static str>,
    {
        self.dialect.hooks = Some((
            set_up.into_iter().map(String::from).collect(),
            tear_down.into_iter().map(String::from).collect(),
        ));
        self
    }

    /// Let `n` more statements through, then fail every one as a closed pool.
    pub(crate) fn disconnect_after_statements(&self, n: usize) {
        let applied = self.executed.lock().unwrap().len();
        *self.disconnect_after.lock().unwrap() = Some(applied + n);
    }

    /// Make the limit scan report no rows regardless of content.
    pub(crate) fn set_blind_limit_scan(&self, blind: bool) {
        self.blind_limit_scan.store(blind, Ordering::SeqCst);
    }

    /// Report a fingerprint for `key` that matches no other side.
    pub(crate) fn corrupt_fingerprint(&self, table: &str, key: KeyTuple) {
        self.corrupted
            .lock()
            .unwrap()
            .insert(format!("{}/{}", table, key.canonical()));
    }

    /// Apply a change intent directly to the stored rows.
    pub(crate) fn apply(&self, table: &str, intent: &Intent) {
        let mut tables = self.tables.lock().unwrap();
        let Some(t) = tables.get_mut(table) else {
            return;
        };
        match intent {
            Intent::SetUp | Intent::TearDown => {}
            Intent::Delete { key } => {
                if let Some(pos) = t.position(key) {
                    t.rows.remove(pos);
                }
            }
            Intent::Insert { row } => {
                let Some(key) = t.key(row) else {
                    return;
                };
                match t.position(&key) {
                    Some(pos) => t.rows[pos] = row.clone(),
                    None => {
                        t.rows.push(row.clone());
                        t.sort();
                    }
                }
            }
            Intent::Update { values, key } => {
                if let Some(pos) = t.position(key) {
                    for (name, value) in values.iter() {
                        t.rows[pos].push(name, value.clone());
                    }
                }
            }
        }
    }

    fn check_query(&self, table: &str) -> Result<()> {
        let n = self.queries.fetch_add(1, Ordering::SeqCst);
        match *self.fail_after.lock().unwrap() {
            Some(limit) if n >= limit => Err(SyncError::query(table, "simulated query failure")),
            _ => Ok(()),
        }
    }

    /// Keys of `table` in `(lower, upper]`, ordered.
    fn keys(
        &self,
        table: &str,
        key_fields: &[String],
        lower: Option<&KeyTuple>,
        upper: Option<&KeyTuple>,
    ) -> Result<Vec<KeyTuple>> {
        self.check_query(table)?;
        let condition = range_condition(key_fields, lower, upper, 0)?.condition;
        let tables = self.tables.lock().unwrap();
        let Some(t) = tables.get(table) else {
            return Err(SyncError::query(table, "no such table"));
        };
        let mut keys = Vec::new();
        for row in &t.rows {
            let key = KeyTuple::from_row(row, key_fields)?;
            if condition.eval(&key) {
                keys.push(key);
            }
        }
        keys.sort();
        Ok(keys)
    }

    async fn fetch_rows(&self, table: &Table, keys: &[KeyTuple]) -> Result<Vec<Row>> {
        self.check_query(&table.name)?;
        let columns = table.writable_columns();
        let tables = self.tables.lock().unwrap();
        let Some(t) = tables.get(&table.name) else {
            return Err(SyncError::query(&table.name, "no such table"));
        };
        Ok(t.rows
            .iter()
            .filter(|r| t.key(r).map(|k| keys.contains(&k)).unwrap_or(false))
            .map(|r| r.only(&columns))
            .collect())
    }
}

fn fingerprint(row: &Row, value_fields: &[String]) -> String {
    let mut hasher = Sha256::new();
    for field in value_fields {
        match row.get(field).and_then(|v| v.compare_string()) {
            Some(s) => hasher.update(format!("V{}:{}", s.chars().count(), s)),
            None => hasher.update("N"),
        }
    }
    format!("{:x}", hasher.finalize())
}

#[async_trait]
impl DataProvider for MemoryEngine {
    async fn keys_in_range(
        &self,
        table: &str,
        key_fields: &[String],
        lower: Option<&KeyTuple>,
        upper: Option<&KeyTuple>,
    ) -> Result<Vec<KeyTuple>> {
        self.keys(table, key_fields, lower, upper)
    }

    async fn greatest_key_at_limit(
        &self,
        table: &str,
        key_fields: &[String],
        limit: usize,
        offset: Option<&KeyTuple>,
    ) -> Result<Option<KeyTuple>> {
        let keys = self.keys(table, key_fields, offset, None)?;
        if self.blind_limit_scan.load(Ordering::SeqCst) {
            return Ok(None);
        }
        Ok(keys.into_iter().take(limit).last())
    }

    async fn row_count_in_range(
        &self,
        table: &str,
        key_fields: &[String],
        lower: Option<&KeyTuple>,
        upper: Option<&KeyTuple>,
    ) -> Result<u64> {
        Ok(self.keys(table, key_fields, lower, upper)?.len() as u64)
    }

    async fn hashed_values_for_keys(
        &self,
        table: &str,
        key_fields: &[String],
        value_fields: &[String],
        keys: &[KeyTuple],
    ) -> Result<FingerprintMap> {
        if keys.is_empty() {
            return Ok(FingerprintMap::new());
        }
        self.check_query(table)?;
        let corrupted = self.corrupted.lock().unwrap().clone();
        let tables = self.tables.lock().unwrap();
        let Some(t) = tables.get(table) else {
            return Err(SyncError::query(table, "no such table"));
        };
        let mut out = FingerprintMap::new();
        for row in &t.rows {
            let key = KeyTuple::from_row(row, key_fields)?;
            if !keys.contains(&key) {
                continue;
            }
            let canonical = key.canonical();
            let mut hash = fingerprint(row, value_fields);
            if corrupted.contains(&format!("{}/{}", table, canonical)) {
                hash.push_str("-corrupt");
            }
            out.insert(canonical, Fingerprint { hash, key });
        }
        Ok(out)
    }

    fn rows_for_keys<'a>(&'a self, table: &'a Table, keys: &'a [KeyTuple]) -> RowStream<'a> {
        chunked_rows(table, keys, move |chunk| self.fetch_rows(table, chunk))
    }
}

#[async_trait]
impl TableProvider for MemoryEngine {
    async fn current_database(&self) -> Result<String> {
        Ok(self.database.clone())
    }

    async fn table_names(&self) -> Result<Vec<String>> {
        Ok(self.tables.lock().unwrap().keys().cloned().collect())
    }

    async fn columns(&self, table: &str) -> Result<Vec<Column>> {
        Ok(self
            .tables
            .lock()
            .unwrap()
            .get(table)
            .map(|t| t.table.columns.clone())
            .unwrap_or_default())
    }

    async fn primary_key(&self, table: &str) -> Result<Vec<String>> {
        Ok(self
            .tables
            .lock()
            .unwrap()
            .get(table)
            .map(|t| t.table.primary_key.clone())
            .unwrap_or_default())
    }

    async fn foreign_keys(&self, table: &str) -> Result<Vec<ForeignKey>> {
        Ok(self
            .tables
            .lock()
            .unwrap()
            .get(table)
            .map(|t| t.table.foreign_keys.clone())
            .unwrap_or_default())
    }
}

#[async_trait]
impl StatementExecutor for MemoryEngine {
    async fn execute(&self, sql: &str) -> Result<u64> {
        let applied = self.executed.lock().unwrap().len();
        if matches!(*self.disconnect_after.lock().unwrap(), Some(limit) if applied >= limit) {
            return Err(SyncError::Mysql(sqlx::Error::PoolClosed));
        }
        let rejected = self
            .fail_needles
            .lock()
            .unwrap()
            .iter()
            .any(|needle| sql.contains(needle.as_str()));
        if rejected {
            return Err(SyncError::query("memory", format!("rejected statement: {}", sql)));
        }
        self.executed.lock().unwrap().push(sql.to_string());
        Ok(1)
    }
}

impl DbEngine for MemoryEngine {
    fn dialect(&self) -> &dyn Dialect {
        &self.dialect
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> MemoryEngine {
        let table = Table::new("db", "t")
            .with_column(Column::new("id", "int"))
            .with_column(Column::new("v", "varchar"))
            .with_primary_key(["id"]);
        let rows = [3, 1, 2]
            .into_iter()
            .map(|id| Row::new().with("id", id).with("v", "x"))
            .collect();
        MemoryEngine::new("db").with_table(table, rows)
    }

    #[tokio::test]
    async fn test_rows_are_kept_in_key_order() {
        let e = engine();
        let ids: Vec<SqlValue> = e.rows("t").iter().filter_map(|r| r.get("id").cloned()).collect();
        assert_eq!(ids, vec![SqlValue::Int(1), SqlValue::Int(2), SqlValue::Int(3)]);
    }

    #[tokio::test]
    async fn test_apply_intents() {
        let e = engine();
        e.apply(
            "t",
            &Intent::Delete {
                key: KeyTuple::from_pairs([("id", 2)]),
            },
        );
        e.apply(
            "t",
            &Intent::Update {
                values: Row::new().with("v", "y"),
                key: KeyTuple::from_pairs([("id", 3)]),
            },
        );
        e.apply(
            "t",
            &Intent::Insert {
                row: Row::new().with("id", 0).with("v", "z"),
            },
        );
        let values: Vec<String> = e.rows("t").iter().map(|r| r.to_json_string()).collect();
        assert_eq!(
            values,
            vec![r#"{"id":0,"v":"z"}"#, r#"{"id":1,"v":"x"}"#, r#"{"id":3,"v":"y"}"#]
        );
    }

    #[tokio::test]
    async fn test_fingerprint_distinguishes_null_and_empty() {
        let fields = vec!["v".to_string()];
        let a = fingerprint(&Row::new().with("v", SqlValue::Null), &fields);
        let b = fingerprint(&Row::new().with("v", ""), &fields);
        assert_ne!(a, b);
    }
}
