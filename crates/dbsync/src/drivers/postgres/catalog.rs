//! Catalog metadata from PostgreSQL `information_schema` and `pg_catalog`.

use async_trait::async_trait;
use tracing::debug;

use super::PostgresEngine;
use crate::core::schema::{Column, ForeignKey};
use crate::core::traits::TableProvider;
use crate::error::{Result, SyncError};

impl PostgresEngine {
    async fn catalog_query(
        &self,
        context: &str,
        sql: &str,
        table: Option<&str>,
    ) -> Result<Vec<tokio_postgres::Row>> {
        let client = self.client(context).await?;
        let schema = self.dialect.schema();
        let rows = match table {
            Some(table) => client.query(sql, &[&schema, &table]).await,
            None => client.query(sql, &[&schema]).await,
        };
        rows.map_err(|e| SyncError::pool(e, context.to_string()))
    }
}

#[async_trait]
impl TableProvider for PostgresEngine {
    async fn current_database(&self) -> Result<String> {
        Ok(self.dialect.schema().to_string())
    }

    async fn table_names(&self) -> Result<Vec<String>> {
        let query = r#"
            SELECT table_name::text
            FROM information_schema.tables
            WHERE table_type = 'BASE TABLE'
              AND table_schema = $1
            ORDER BY table_name
        "#;
        let rows = self.catalog_query("listing PostgreSQL tables", query, None).await?;
        Ok(rows.iter().map(|r| r.get::<_, String>(0)).collect())
    }

    async fn columns(&self, table: &str) -> Result<Vec<Column>> {
        let query = r#"
            SELECT
                column_name::text,
                ordinal_position::int4,
                column_default::text,
                is_nullable = 'YES',
                data_type::text,
                numeric_precision::int4,
                numeric_scale::int4,
                COALESCE(
                    pg_catalog.col_description(
                        (quote_ident(table_schema) || '.' || quote_ident(table_name))::regclass,
                        ordinal_position::int4
                    ),
                    ''
                ),
                is_generated = 'ALWAYS',
                generation_expression::text
            FROM information_schema.columns
            WHERE table_schema = $1 AND table_name = $2
            ORDER BY ordinal_position
        "#;
        let rows = self
            .catalog_query("loading PostgreSQL columns", query, Some(table))
            .await?;

        let columns: Vec<Column> = rows
            .iter()
            .map(|row| {
                let is_generated: bool = row.get(8);
                Column {
                    name: row.get(0),
                    position: row.get::<_, i32>(1).max(0) as u32,
                    default_value: row.get(2),
                    is_nullable: row.get(3),
                    data_type: row.get(4),
                    numeric_precision: row.get::<_, Option<i32>>(5).map(|v| v.max(0) as u32),
                    numeric_scale: row.get::<_, Option<i32>>(6).map(|v| v.max(0) as u32),
                    comment: row.get(7),
                    is_generated,
                    generation_expression: row
                        .get::<_, Option<String>>(9)
                        .filter(|e| is_generated && !e.is_empty()),
                }
            })
            .collect();

        debug!("Loaded {} columns for {}", columns.len(), table);
        Ok(columns)
    }

    async fn primary_key(&self, table: &str) -> Result<Vec<String>> {
        let query = r#"
            SELECT a.attname::text
            FROM pg_catalog.pg_constraint c
            JOIN pg_catalog.pg_class t ON t.oid = c.conrelid
            JOIN pg_catalog.pg_namespace n ON n.oid = t.relnamespace
            JOIN pg_catalog.pg_attribute a ON a.attrelid = t.oid
            WHERE n.nspname = $1
              AND t.relname = $2
              AND c.contype = 'p'
              AND a.attnum = ANY(c.conkey)
            ORDER BY array_position(c.conkey, a.attnum)
        "#;
        let rows = self
            .catalog_query("loading PostgreSQL primary key", query, Some(table))
            .await?;
        Ok(rows.iter().map(|r| r.get::<_, String>(0)).collect())
    }

    async fn foreign_keys(&self, table: &str) -> Result<Vec<ForeignKey>> {
        // Columns are unnested with their ordinal so composite keys keep
        // their pairing between local and referenced columns.
        let query = r#"
            SELECT
                c.conname::text,
                n.nspname::text,
                t.relname::text,
                ARRAY(
                    SELECT a.attname::text
                    FROM unnest(c.conkey) WITH ORDINALITY AS k(attnum, ord)
                    JOIN pg_catalog.pg_attribute a
                      ON a.attrelid = c.conrelid AND a.attnum = k.attnum
                    ORDER BY k.ord
                ) AS columns,
                rn.nspname::text,
                rt.relname::text,
                ARRAY(
                    SELECT a.attname::text
                    FROM unnest(c.confkey) WITH ORDINALITY AS k(attnum, ord)
                    JOIN pg_catalog.pg_attribute a
                      ON a.attrelid = c.confrelid AND a.attnum = k.attnum
                    ORDER BY k.ord
                ) AS ref_columns
            FROM pg_catalog.pg_constraint c
            JOIN pg_catalog.pg_class t ON t.oid = c.conrelid
            JOIN pg_catalog.pg_namespace n ON n.oid = t.relnamespace
            JOIN pg_catalog.pg_class rt ON rt.oid = c.confrelid
            JOIN pg_catalog.pg_namespace rn ON rn.oid = rt.relnamespace
            WHERE n.nspname = $1
              AND t.relname = $2
              AND c.contype = 'f'
            ORDER BY c.conname
        "#;
        let rows = self
            .catalog_query("loading PostgreSQL foreign keys", query, Some(table))
            .await?;

        let keys: Vec<ForeignKey> = rows
            .iter()
            .map(|row| ForeignKey {
                name: row.get(0),
                schema: row.get(1),
                table_schema: row.get(1),
                table_name: row.get(2),
                column_names: row.get(3),
                referenced_schema: row.get(4),
                referenced_table: row.get(5),
                referenced_columns: row.get(6),
            })
            .collect();

        debug!("Loaded {} foreign keys for {}", keys.len(), table);
        Ok(keys)
    }
}
