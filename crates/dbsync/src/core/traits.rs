//! Core traits for engine-agnostic table synchronization.
//!
//! This module defines the seams between the sync algorithm and the
//! database engines:
//!
//! - [`Dialect`]: quoting rules, fingerprint expression, statement factory
//!   and pre/post-sync hooks for one SQL dialect
//! - [`DataProvider`]: the five queries the window loop issues against each side
//! - [`TableProvider`]: catalog metadata (tables, columns, keys)
//! - [`StatementExecutor`]: applies generated statements to a connection
//! - [`DbEngine`]: everything a destination needs, bundled
//!
//! # Design Patterns
//!
//! - **Strategy**: each dialect supplies its own quoting and statement text
//! - **Template Method**: [`TableProvider::table`] assembles a descriptor from
//!   the individual catalog lookups

use std::collections::HashMap;

use async_trait::async_trait;
use futures::stream::BoxStream;

use super::key::KeyTuple;
use super::schema::{Column, ForeignKey, Table};
use super::value::{Row, SqlValue};
use crate::error::{Result, SyncError};
use crate::sql::params::ParamStyle;

/// Fingerprint of one row's value fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    pub hash: String,
    pub key: KeyTuple,
}

/// Fingerprints keyed by [`KeyTuple::canonical`].
pub type FingerprintMap = HashMap<String, Fingerprint>;

/// Lazily fetched rows, each paired with its canonical key.
pub type RowStream<'a> = BoxStream<'a, Result<(String, Row)>>;

/// SQL syntax strategy for a database engine.
pub trait Dialect: Send + Sync {
    /// Dialect name for logging.
    fn name(&self) -> &str;

    /// Quote an identifier.
    fn quote_ident(&self, name: &str) -> String;

    /// Quote a field name, optionally qualified by a table alias.
    fn quote_field(&self, name: &str, alias: Option<&str>) -> String {
        match alias {
            Some(alias) => format!("{}.{}", self.quote_ident(alias), self.quote_ident(name)),
            None => self.quote_ident(name),
        }
    }

    /// Select-list entry for `column` in a form the driver can decode,
    /// keeping the column name.
    fn select_column(&self, column: &Column, alias: Option<&str>) -> String {
        self.quote_field(&column.name, alias)
    }

    /// Quote a table name, qualified the way this connection addresses it.
    fn quote_table(&self, name: &str) -> String;

    /// Render a value as a SQL literal.
    fn quote_value(&self, value: &SqlValue) -> String;

    /// How queries receive bound key values.
    fn param_style(&self) -> ParamStyle;

    /// Expression producing the fingerprint of `value_fields`.
    ///
    /// Every dialect must produce identical digests for equal text forms,
    /// otherwise cross-engine syncs report phantom drift.
    fn fingerprint_expr(&self, value_fields: &[String], alias: Option<&str>) -> String;

    /// Upsert: insert the row, overwriting non-key fields on key conflict.
    fn make_insert(&self, table: &Table, row: &Row) -> Result<String>;

    /// Update `values` on the single row identified by `key`.
    fn make_update(&self, table: &Table, values: &Row, key: &KeyTuple) -> Result<String>;

    /// Delete the single row identified by `key`.
    fn make_delete(&self, table: &Table, key: &KeyTuple) -> Result<String>;

    /// Statements run once before the first mutation of a table sync.
    fn set_up(&self) -> Vec<String>;

    /// Statements run once after a table sync that ran [`Dialect::set_up`].
    fn tear_down(&self) -> Vec<String>;

    /// `a.k1 = v1 AND a.k2 = v2` for one key tuple.
    fn key_equals(&self, key: &KeyTuple, alias: Option<&str>) -> String {
        key.iter()
            .map(|(field, value)| {
                format!(
                    "{} = {}",
                    self.quote_field(field, alias),
                    self.quote_value(&value.to_sql())
                )
            })
            .collect::<Vec<_>>()
            .join(" AND ")
    }
}

/// Query contract each connection exposes to the sync engine.
///
/// Bounds are exclusive below and inclusive above: `lower < key <= upper`.
/// A missing bound is open. Empty key sets short-circuit to empty results
/// without issuing a query.
#[async_trait]
pub trait DataProvider: Send + Sync {
    /// All key tuples in `(lower, upper]`, ordered by key.
    async fn keys_in_range(
        &self,
        table: &str,
        key_fields: &[String],
        lower: Option<&KeyTuple>,
        upper: Option<&KeyTuple>,
    ) -> Result<Vec<KeyTuple>>;

    /// Key of the `limit`-th row after `offset`, or of the last row when
    /// fewer exist, or `None` when no row follows `offset`.
    async fn greatest_key_at_limit(
        &self,
        table: &str,
        key_fields: &[String],
        limit: usize,
        offset: Option<&KeyTuple>,
    ) -> Result<Option<KeyTuple>>;

    /// Number of rows in `(lower, upper]`.
    async fn row_count_in_range(
        &self,
        table: &str,
        key_fields: &[String],
        lower: Option<&KeyTuple>,
        upper: Option<&KeyTuple>,
    ) -> Result<u64>;

    /// Fingerprints of `value_fields` for the given keys. Keys without a
    /// row on this side are absent from the result.
    async fn hashed_values_for_keys(
        &self,
        table: &str,
        key_fields: &[String],
        value_fields: &[String],
        keys: &[KeyTuple],
    ) -> Result<FingerprintMap>;

    /// Full rows (all non-generated columns) for the given keys, streamed.
    /// Order is unspecified.
    fn rows_for_keys<'a>(&'a self, table: &'a Table, keys: &'a [KeyTuple]) -> RowStream<'a>;
}

/// Catalog metadata for one connection.
#[async_trait]
pub trait TableProvider: Send + Sync {
    /// Database (or schema) the connection works in.
    async fn current_database(&self) -> Result<String>;

    /// All base tables, sorted by name.
    async fn table_names(&self) -> Result<Vec<String>>;

    async fn columns(&self, table: &str) -> Result<Vec<Column>>;

    /// Primary-key field names in key order.
    async fn primary_key(&self, table: &str) -> Result<Vec<String>>;

    async fn foreign_keys(&self, table: &str) -> Result<Vec<ForeignKey>>;

    /// Assemble the full descriptor.
    async fn table(&self, table: &str) -> Result<Table> {
        let columns = self.columns(table).await?;
        if columns.is_empty() {
            return Err(SyncError::Config(format!("table {} does not exist", table)));
        }
        Ok(Table {
            schema: self.current_database().await?,
            name: table.to_string(),
            columns,
            primary_key: self.primary_key(table).await?,
            foreign_keys: self.foreign_keys(table).await?,
        })
    }
}

/// Applies statements to a connection.
#[async_trait]
pub trait StatementExecutor: Send + Sync {
    /// Execute one statement, returning the affected row count.
    async fn execute(&self, sql: &str) -> Result<u64>;
}

/// A full engine handle: data, catalog, execution and dialect.
pub trait DbEngine: DataProvider + TableProvider + StatementExecutor {
    fn dialect(&self) -> &dyn Dialect;
}
