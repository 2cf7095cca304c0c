//! PostgreSQL SQL dialect (Strategy pattern).
//!
//! Provides PostgreSQL-specific identifier quoting, literal rendering,
//! `ON CONFLICT` upserts and replication-role hooks.

use crate::core::key::KeyTuple;
use crate::core::schema::{Column, Table};
use crate::core::traits::Dialect;
use crate::core::value::{hex, Row, SqlValue};
use crate::drivers::common::version::{unparsable, ServerVersion};
use crate::error::{Result, SyncError};
use crate::sql::params::ParamStyle;
use crate::sql::text::normalize_standard_statement as normalize_statement;

/// Oldest supported PostgreSQL server (first release with `ON CONFLICT`).
pub const POSTGRES_MIN_VERSION: ServerVersion = ServerVersion::new(9, 5, 0);

/// PostgreSQL dialect implementation.
///
/// Tables are addressed as `"schema"."name"` within the configured schema.
#[derive(Debug, Clone)]
pub struct PostgresDialect {
    schema: String,
}

impl PostgresDialect {
    /// Create a dialect for tables in `schema`.
    pub fn new(schema: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
        }
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// Validate a `SHOW server_version` result.
    pub fn check_version(&self, raw: &str) -> Result<ServerVersion> {
        let version =
            ServerVersion::parse_leading(raw).ok_or_else(|| unparsable("PostgreSQL", raw))?;
        version.require_at_least(POSTGRES_MIN_VERSION, "PostgreSQL", raw)?;
        Ok(version)
    }

    fn text_literal(s: &str) -> String {
        format!("'{}'", s.replace('\'', "''"))
    }

    fn conflict_target(&self, table: &Table) -> String {
        table
            .primary_key
            .iter()
            .map(|k| self.quote_ident(k))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// `information_schema` data types the row decoder reads natively. Anything
/// else (enums, arrays, ranges, network and geometric types) is fetched as text.
const DECODED_TYPES: &[&str] = &[
    "boolean",
    "smallint",
    "integer",
    "bigint",
    "oid",
    "real",
    "double precision",
    "numeric",
    "uuid",
    "timestamp without time zone",
    "timestamp with time zone",
    "date",
    "time without time zone",
    "bytea",
    "json",
    "jsonb",
    "text",
    "character varying",
    "character",
    "name",
];

impl Dialect for PostgresDialect {
    fn name(&self) -> &str {
        "postgres"
    }

    fn quote_ident(&self, name: &str) -> String {
        // Handle names that contain double quotes by doubling them
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    fn quote_table(&self, name: &str) -> String {
        format!("{}.{}", self.quote_ident(&self.schema), self.quote_ident(name))
    }

    fn select_column(&self, column: &Column, alias: Option<&str>) -> String {
        let field = self.quote_field(&column.name, alias);
        if DECODED_TYPES.contains(&column.data_type.to_lowercase().as_str()) {
            field
        } else {
            format!("CAST({} AS TEXT) AS {}", field, self.quote_ident(&column.name))
        }
    }

    fn quote_value(&self, value: &SqlValue) -> String {
        match value {
            SqlValue::Null => "NULL".to_string(),
            SqlValue::Bool(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
            SqlValue::Int(v) => v.to_string(),
            SqlValue::UInt(v) => v.to_string(),
            SqlValue::Float(v) if v.is_nan() => "'NaN'".to_string(),
            SqlValue::Float(v) if v.is_infinite() => {
                if *v > 0.0 { "'Infinity'" } else { "'-Infinity'" }.to_string()
            }
            SqlValue::Float(v) => v.to_string(),
            SqlValue::Decimal(v) => v.to_string(),
            SqlValue::Bytes(b) => format!("'\\x{}'", &hex(b)[2..]),
            other => Self::text_literal(&other.compare_string().unwrap_or_default()),
        }
    }

    fn param_style(&self) -> ParamStyle {
        ParamStyle::Inline
    }

    fn fingerprint_expr(&self, value_fields: &[String], alias: Option<&str>) -> String {
        if value_fields.is_empty() {
            return "MD5('')".to_string();
        }
        let parts: Vec<String> = value_fields
            .iter()
            .map(|f| {
                let text = format!("CAST({} AS TEXT)", self.quote_field(f, alias));
                format!(
                    "COALESCE('V' || CAST(CHAR_LENGTH({t}) AS TEXT) || ':' || {t}, 'N')",
                    t = text
                )
            })
            .collect();
        format!("MD5(CONCAT({}))", parts.join(", "))
    }

    fn make_insert(&self, table: &Table, row: &Row) -> Result<String> {
        if row.is_empty() {
            return Err(SyncError::write(&table.name, "cannot insert an empty row"));
        }
        let columns: Vec<String> = row.names().map(|n| self.quote_ident(n)).collect();
        let values: Vec<String> = row.iter().map(|(_, v)| self.quote_value(v)).collect();
        let updates: Vec<String> = row
            .names()
            .filter(|n| !table.primary_key.iter().any(|k| k == n))
            .map(|n| format!("{c} = EXCLUDED.{c}", c = self.quote_ident(n)))
            .collect();

        let on_conflict = if updates.is_empty() || table.primary_key.is_empty() {
            "ON CONFLICT DO NOTHING".to_string()
        } else {
            format!(
                "ON CONFLICT ({}) DO UPDATE SET {}",
                self.conflict_target(table),
                updates.join(", ")
            )
        };

        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({}) {}",
            self.quote_table(&table.name),
            columns.join(", "),
            values.join(", "),
            on_conflict
        );
        Ok(normalize_statement(&sql))
    }

    fn make_update(&self, table: &Table, values: &Row, key: &KeyTuple) -> Result<String> {
        if values.is_empty() || key.is_empty() {
            return Err(SyncError::write(&table.name, "update needs values and a key"));
        }
        let assignments: Vec<String> = values
            .iter()
            .map(|(name, value)| format!("{} = {}", self.quote_ident(name), self.quote_value(value)))
            .collect();
        let sql = format!(
            "UPDATE {} SET {} WHERE {}",
            self.quote_table(&table.name),
            assignments.join(", "),
            self.key_equals(key, None)
        );
        Ok(normalize_statement(&sql))
    }

    fn make_delete(&self, table: &Table, key: &KeyTuple) -> Result<String> {
        if key.is_empty() {
            return Err(SyncError::write(&table.name, "delete needs a key"));
        }
        let sql = format!(
            "DELETE FROM {} WHERE {}",
            self.quote_table(&table.name),
            self.key_equals(key, None)
        );
        Ok(normalize_statement(&sql))
    }

    // Replica role skips FK triggers; it needs superuser or a role granted
    // session_replication_role.
    fn set_up(&self) -> Vec<String> {
        vec![normalize_statement("SET session_replication_role = replica")]
    }

    fn tear_down(&self) -> Vec<String> {
        vec![normalize_statement("SET session_replication_role = DEFAULT")]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schema::Column;

    fn table() -> Table {
        Table::new("public", "items")
            .with_column(Column::new("id", "integer"))
            .with_column(Column::new("name", "text"))
            .with_primary_key(["id"])
    }

    #[test]
    fn test_quote_table_uses_schema() {
        let d = PostgresDialect::new("sales");
        assert_eq!(d.quote_table("orders"), "\"sales\".\"orders\"");
        assert_eq!(d.quote_ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn test_select_column_casts_undecodable_types() {
        let d = PostgresDialect::new("public");
        assert_eq!(
            d.select_column(&Column::new("id", "integer"), Some("a")),
            "\"a\".\"id\""
        );
        assert_eq!(
            d.select_column(&Column::new("mood", "USER-DEFINED"), Some("a")),
            "CAST(\"a\".\"mood\" AS TEXT) AS \"mood\""
        );
        assert_eq!(
            d.select_column(&Column::new("tags", "ARRAY"), None),
            "CAST(\"tags\" AS TEXT) AS \"tags\""
        );
    }

    #[test]
    fn test_quote_value() {
        let d = PostgresDialect::new("public");
        assert_eq!(d.quote_value(&SqlValue::Bool(false)), "FALSE");
        assert_eq!(d.quote_value(&SqlValue::Text("it's".into())), "'it''s'");
        assert_eq!(d.quote_value(&SqlValue::Text("a\\b".into())), "'a\\b'");
        assert_eq!(d.quote_value(&SqlValue::Bytes(vec![0x01, 0xff])), "'\\x01ff'");
        assert_eq!(d.quote_value(&SqlValue::Float(f64::NEG_INFINITY)), "'-Infinity'");
        assert_eq!(d.quote_value(&SqlValue::Null), "NULL");
    }

    #[test]
    fn test_make_insert_on_conflict() {
        let d = PostgresDialect::new("public");
        let row = Row::new().with("id", 1).with("name", "a");
        assert_eq!(
            d.make_insert(&table(), &row).unwrap(),
            "INSERT INTO \"public\".\"items\" (\"id\", \"name\") VALUES (1, 'a') \
             ON CONFLICT (\"id\") DO UPDATE SET \"name\" = EXCLUDED.\"name\";"
        );
        let key_only = Row::new().with("id", 1);
        assert!(d
            .make_insert(&table(), &key_only)
            .unwrap()
            .ends_with("ON CONFLICT DO NOTHING;"));
    }

    #[test]
    fn test_make_update_and_delete() {
        let d = PostgresDialect::new("public");
        let key = KeyTuple::from_pairs([("id", 4)]);
        assert_eq!(
            d.make_update(&table(), &Row::new().with("name", "x"), &key).unwrap(),
            "UPDATE \"public\".\"items\" SET \"name\" = 'x' WHERE \"id\" = 4;"
        );
        assert_eq!(
            d.make_delete(&table(), &key).unwrap(),
            "DELETE FROM \"public\".\"items\" WHERE \"id\" = 4;"
        );
    }

    #[test]
    fn test_fingerprint_expr() {
        let d = PostgresDialect::new("public");
        assert_eq!(
            d.fingerprint_expr(&["v".to_string()], Some("a")),
            "MD5(CONCAT(COALESCE('V' || CAST(CHAR_LENGTH(CAST(\"a\".\"v\" AS TEXT)) AS TEXT) \
             || ':' || CAST(\"a\".\"v\" AS TEXT), 'N')))"
        );
        assert_eq!(d.fingerprint_expr(&[], None), "MD5('')");
    }

    #[test]
    fn test_version_check() {
        let d = PostgresDialect::new("public");
        assert_eq!(
            d.check_version("16.2 (Debian 16.2-1.pgdg120+2)").unwrap(),
            ServerVersion::new(16, 2, 0)
        );
        assert!(d.check_version("9.5.25").is_ok());
        assert!(d.check_version("9.4.26").is_err());
    }

    #[test]
    fn test_hooks() {
        let d = PostgresDialect::new("public");
        assert_eq!(d.set_up(), vec!["SET session_replication_role = replica;"]);
        assert_eq!(d.tear_down(), vec!["SET session_replication_role = DEFAULT;"]);
    }
}
