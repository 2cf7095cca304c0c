//! Data-provider queries against PostgreSQL.

use async_trait::async_trait;

use super::PostgresEngine;
use crate::core::key::KeyTuple;
use crate::core::schema::Table;
use crate::core::traits::{DataProvider, Fingerprint, FingerprintMap, RowStream};
use crate::core::value::{Row, SqlValue};
use crate::drivers::common::chunked_rows;
use crate::error::{Result, SyncError};
use crate::sql::params::BoundQuery;
use crate::sql::queries;

impl PostgresEngine {
    async fn fetch(&self, table: &str, sql: &str) -> Result<Vec<tokio_postgres::Row>> {
        let client = self.client("getting connection for data query").await?;
        client
            .query(sql, &[])
            .await
            .map_err(|e| SyncError::query(table, e))
    }

    async fn fetch_bound(&self, table: &str, query: &BoundQuery) -> Result<Vec<Row>> {
        let rendered = query.render(&self.dialect)?;
        let rows = self.fetch(table, &rendered.sql).await?;
        rows.iter().map(|r| pg_row(table, r)).collect()
    }

    async fn fetch_rows(&self, table: &Table, keys: &[KeyTuple]) -> Result<Vec<Row>> {
        let Some(sql) = queries::rows_for_keys(&self.dialect, table, keys) else {
            return Ok(Vec::new());
        };
        let rows = self.fetch(&table.name, &sql).await?;
        rows.iter().map(|r| pg_row(&table.name, r)).collect()
    }
}

#[async_trait]
impl DataProvider for PostgresEngine {
    async fn keys_in_range(
        &self,
        table: &str,
        key_fields: &[String],
        lower: Option<&KeyTuple>,
        upper: Option<&KeyTuple>,
    ) -> Result<Vec<KeyTuple>> {
        let query = queries::keys_in_range(&self.dialect, table, key_fields, lower, upper)?;
        self.fetch_bound(table, &query)
            .await?
            .iter()
            .map(|row| KeyTuple::from_row(row, key_fields))
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
        self.fetch_bound(table, &query)
            .await?
            .first()
            .map(|row| KeyTuple::from_row(row, key_fields))
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
        match rows.first().and_then(|r| r.get("row_count")) {
            Some(SqlValue::Int(n)) => Ok((*n).max(0) as u64),
            Some(other) => Err(SyncError::query(
                table,
                format!("unexpected row count value {}", other),
            )),
            None => Ok(0),
        }
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
        let rows = self.fetch(table, &sql).await?;

        let mut out = FingerprintMap::with_capacity(rows.len());
        for r in &rows {
            let row = pg_row(table, r)?;
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

/// Convert a PostgreSQL result row using the column type names.
///
/// A column that cannot be decoded fails the query; writing it back as NULL
/// would overwrite real data on the other side.
pub(super) fn pg_row(table: &str, row: &tokio_postgres::Row) -> Result<Row> {
    let mut out = Row::with_capacity(row.len());
    for (idx, column) in row.columns().iter().enumerate() {
        let type_name = column.type_().name();
        let value = pg_value(row, idx, type_name).map_err(|e| {
            SyncError::query(
                table,
                format!(
                    "cannot decode column {} of type {}: {}",
                    column.name(),
                    type_name,
                    e
                ),
            )
        })?;
        out.push(column.name(), value);
    }
    Ok(out)
}

fn pg_value(
    row: &tokio_postgres::Row,
    idx: usize,
    type_name: &str,
) -> std::result::Result<SqlValue, tokio_postgres::Error> {
    let value = match type_name {
        "bool" => row.try_get::<_, Option<bool>>(idx).map(|v| v.map(SqlValue::Bool)),
        "int2" => row
            .try_get::<_, Option<i16>>(idx)
            .map(|v| v.map(|n| SqlValue::Int(i64::from(n)))),
        "int4" => row
            .try_get::<_, Option<i32>>(idx)
            .map(|v| v.map(|n| SqlValue::Int(i64::from(n)))),
        "int8" => row.try_get::<_, Option<i64>>(idx).map(|v| v.map(SqlValue::Int)),
        "oid" => row
            .try_get::<_, Option<u32>>(idx)
            .map(|v| v.map(|n| SqlValue::Int(i64::from(n)))),
        "float4" => row
            .try_get::<_, Option<f32>>(idx)
            .map(|v| v.map(|n| SqlValue::Float(f64::from(n)))),
        "float8" => row.try_get::<_, Option<f64>>(idx).map(|v| v.map(SqlValue::Float)),
        "numeric" => row
            .try_get::<_, Option<rust_decimal::Decimal>>(idx)
            .map(|v| v.map(SqlValue::Decimal)),
        "uuid" => row.try_get::<_, Option<uuid::Uuid>>(idx).map(|v| v.map(SqlValue::Uuid)),
        "timestamp" => row
            .try_get::<_, Option<chrono::NaiveDateTime>>(idx)
            .map(|v| v.map(SqlValue::DateTime)),
        "timestamptz" => row
            .try_get::<_, Option<chrono::DateTime<chrono::FixedOffset>>>(idx)
            .map(|v| v.map(SqlValue::DateTimeTz)),
        "date" => row
            .try_get::<_, Option<chrono::NaiveDate>>(idx)
            .map(|v| v.map(SqlValue::Date)),
        "time" => row
            .try_get::<_, Option<chrono::NaiveTime>>(idx)
            .map(|v| v.map(SqlValue::Time)),
        "bytea" => row.try_get::<_, Option<Vec<u8>>>(idx).map(|v| v.map(SqlValue::Bytes)),
        "json" | "jsonb" => row
            .try_get::<_, Option<serde_json::Value>>(idx)
            .map(|v| v.map(SqlValue::Json)),
        // text, varchar, bpchar, name and columns cast to text by the row query.
        _ => row.try_get::<_, Option<String>>(idx).map(|v| v.map(SqlValue::Text)),
    }?;
    Ok(value.unwrap_or(SqlValue::Null))
}
