//! Data-provider queries against MySQL/MariaDB.

use async_trait::async_trait;
use sqlx::mysql::MySqlRow;
use sqlx::{Column as _, Row as _, TypeInfo, ValueRef};

use super::MysqlEngine;
use crate::core::key::{KeyTuple, KeyValue};
use crate::core::schema::Table;
use crate::core::traits::{DataProvider, Fingerprint, FingerprintMap, RowStream};
use crate::core::value::{Row, SqlValue};
use crate::drivers::common::chunked_rows;
use crate::error::{Result, SyncError};
use crate::sql::params::BoundQuery;
use crate::sql::queries;

impl MysqlEngine {
    /// Render and run a parameterized query on the pool.
    async fn fetch_bound(&self, table: &str, query: &BoundQuery) -> Result<Vec<MySqlRow>> {
        let rendered = query.render(&self.dialect)?;
        let mut q = sqlx::query(&rendered.sql);
        for value in rendered.binds {
            q = match value {
                KeyValue::Int(v) => q.bind(v),
                KeyValue::Float(v) => q.bind(v),
                KeyValue::Text(v) => q.bind(v),
            };
        }
        q.fetch_all(&self.pool)
            .await
            .map_err(|e| SyncError::query(table, e))
    }

    async fn fetch_plain(&self, table: &str, sql: &str) -> Result<Vec<MySqlRow>> {
        sqlx::query(sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| SyncError::query(table, e))
    }

    async fn fetch_rows(&self, table: &Table, keys: &[KeyTuple]) -> Result<Vec<Row>> {
        let Some(sql) = queries::rows_for_keys(&self.dialect, table, keys) else {
            return Ok(Vec::new());
        };
        let rows = self.fetch_plain(&table.name, &sql).await?;
        rows.iter().map(|r| mysql_row(&table.name, r)).collect()
    }
}

#[async_trait]
impl DataProvider for MysqlEngine {
    async fn keys_in_range(
        &self,
        table: &str,
        key_fields: &[String],
        lower: Option<&KeyTuple>,
        upper: Option<&KeyTuple>,
    ) -> Result<Vec<KeyTuple>> {
        let query = queries::keys_in_range(&self.dialect, table, key_fields, lower, upper)?;
        let rows = self.fetch_bound(table, &query).await?;
        rows.iter()
            .map(|r| KeyTuple::from_row(&mysql_row(table, r)?, key_fields))
            .collect()
    }

    async fn greatest_key_at_limit(
        &self,
        table: &str,
        key_fields: &[String],
        limit: usize,
        offset: Option<&KeyTuple>,
    ) -> Result<Option<KeyTuple>> {
        let query = queries::greatest_key_at_limit(&self.dialect, table, key_fields, limit, offset)?;
        let rows = self.fetch_bound(table, &query).await?;
        rows.first()
            .map(|r| KeyTuple::from_row(&mysql_row(table, r)?, key_fields))
            .transpose()
    }

    async fn row_count_in_range(
        &self,
        table: &str,
        key_fields: &[String],
        lower: Option<&KeyTuple>,
        upper: Option<&KeyTuple>,
    ) -> Result<u64> {
        let query = queries::row_count_in_range(&self.dialect, table, key_fields, lower, upper)?;
        let rows = self.fetch_bound(table, &query).await?;
        let count: i64 = match rows.first() {
            Some(row) => row.try_get("row_count").map_err(|e| SyncError::query(table, e))?,
            None => 0,
        };
        Ok(count.max(0) as u64)
    }

    async fn hashed_values_for_keys(
        &self,
        table: &str,
        key_fields: &[String],
        value_fields: &[String],
        keys: &[KeyTuple],
    ) -> Result<FingerprintMap> {
        let Some(sql) =
            queries::hashed_values_for_keys(&self.dialect, table, key_fields, value_fields, keys)
        else {
            return Ok(FingerprintMap::new());
        };
        let rows = self.fetch_plain(table, &sql).await?;

        let mut out = FingerprintMap::with_capacity(rows.len());
        for r in &rows {
            let row = mysql_row(table, r)?;
            let key = KeyTuple::from_row(&row, key_fields)?;
            let hash = row
                .get("row_hash")
                .and_then(SqlValue::compare_string)
                .ok_or_else(|| SyncError::query(table, "fingerprint query returned NULL"))?;
            out.insert(key.canonical(), Fingerprint { hash, key });
        }
        Ok(out)
    }

    fn rows_for_keys<'a>(&'a self, table: &'a Table, keys: &'a [KeyTuple]) -> RowStream<'a> {
        chunked_rows(table, keys, move |chunk| self.fetch_rows(table, chunk))
    }
}

/// Convert a MySQL result row using the result-set column types.
pub(super) fn mysql_row(table: &str, row: &MySqlRow) -> Result<Row> {
    let mut out = Row::with_capacity(row.len());
    for (idx, column) in row.columns().iter().enumerate() {
        let type_name = column.type_info().name().to_uppercase();
        let value = mysql_value(row, idx, &type_name).ok_or_else(|| {
            SyncError::query(
                table,
                format!("cannot decode column {} of type {}", column.name(), type_name),
            )
        })?;
        out.push(column.name(), value);
    }
    Ok(out)
}

fn mysql_value(row: &MySqlRow, idx: usize, type_name: &str) -> Option<SqlValue> {
    if row.try_get_raw(idx).ok()?.is_null() {
        return Some(SqlValue::Null);
    }

    let typed = if type_name.ends_with("UNSIGNED") {
        row.try_get::<u64, _>(idx).ok().map(SqlValue::UInt)
    } else {
        match type_name {
            "BOOLEAN" | "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" => {
                row.try_get::<i64, _>(idx).ok().map(SqlValue::Int)
            }
            "FLOAT" => row
                .try_get::<f32, _>(idx)
                .ok()
                .map(|v| SqlValue::Float(f64::from(v))),
            "DOUBLE" => row.try_get::<f64, _>(idx).ok().map(SqlValue::Float),
            "DECIMAL" => row
                .try_get::<rust_decimal::Decimal, _>(idx)
                .ok()
                .map(SqlValue::Decimal),
            "DATE" => row
                .try_get::<chrono::NaiveDate, _>(idx)
                .ok()
                .map(SqlValue::Date),
            "TIME" => row
                .try_get::<chrono::NaiveTime, _>(idx)
                .ok()
                .map(SqlValue::Time),
            "DATETIME" | "TIMESTAMP" => row
                .try_get::<chrono::NaiveDateTime, _>(idx)
                .ok()
                .map(SqlValue::DateTime),
            "YEAR" => row
                .try_get::<u16, _>(idx)
                .ok()
                .map(|v| SqlValue::Int(i64::from(v))),
            "JSON" => row
                .try_get::<serde_json::Value, _>(idx)
                .ok()
                .map(SqlValue::Json),
            "BINARY" | "VARBINARY" | "BLOB" | "TINYBLOB" | "MEDIUMBLOB" | "LONGBLOB" | "BIT"
            | "GEOMETRY" => row.try_get::<Vec<u8>, _>(idx).ok().map(SqlValue::Bytes),
            _ => None,
        }
    };

    typed
        .or_else(|| row.try_get::<String, _>(idx).ok().map(SqlValue::Text))
        .or_else(|| {
            row.try_get::<Vec<u8>, _>(idx)
                .ok()
                .map(|b| SqlValue::Text(String::from_utf8_lossy(&b).into_owned()))
        })
}
