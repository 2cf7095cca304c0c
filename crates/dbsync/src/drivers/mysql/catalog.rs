//! Catalog metadata from MySQL/MariaDB `information_schema`.

use async_trait::async_trait;
use sqlx::mysql::MySqlRow;
use sqlx::Row as _;

use super::{MysqlEngine, MysqlFlavor};
use crate::core::schema::{Column, ForeignKey};
use crate::core::traits::TableProvider;
use crate::error::{Result, SyncError};

impl MysqlEngine {
    /// Expression flagging engine-computed columns. MySQL reports
    /// `VIRTUAL GENERATED` / `STORED GENERATED` in EXTRA (and
    /// `DEFAULT_GENERATED` for expression defaults, which are writable);
    /// MariaDB has IS_GENERATED.
    fn generated_expr(&self) -> &'static str {
        match self.dialect.flavor() {
            MysqlFlavor::Mysql => "IF(EXTRA IN ('VIRTUAL GENERATED', 'STORED GENERATED'), 1, 0)",
            MysqlFlavor::MariaDb => "IF(IS_GENERATED <> 'NEVER', 1, 0)",
        }
    }

    async fn catalog_rows(&self, context: &str, sql: &str, binds: &[&str]) -> Result<Vec<MySqlRow>> {
        let mut q = sqlx::query(sql);
        for b in binds {
            q = q.bind(*b);
        }
        q.fetch_all(&self.pool)
            .await
            .map_err(|e| SyncError::pool(e, context.to_string()))
    }
}

#[async_trait]
impl TableProvider for MysqlEngine {
    async fn current_database(&self) -> Result<String> {
        let name = self
            .database_name
            .get_or_try_init(|| async {
                sqlx::query_scalar::<_, Option<String>>("SELECT DATABASE()")
                    .fetch_one(&self.pool)
                    .await
                    .map_err(|e| SyncError::pool(e, "reading current MySQL database"))?
                    .ok_or_else(|| SyncError::Config("MySQL connection has no default database".into()))
            })
            .await?;
        Ok(name.clone())
    }

    async fn table_names(&self) -> Result<Vec<String>> {
        let db = self.current_database().await?;
        let rows = self
            .catalog_rows(
                "listing MySQL tables",
                r#"
                SELECT CAST(TABLE_NAME AS CHAR(255)) AS TABLE_NAME
                FROM INFORMATION_SCHEMA.TABLES
                WHERE TABLE_SCHEMA = ? AND TABLE_TYPE = 'BASE TABLE'
                ORDER BY TABLE_NAME
                "#,
                &[db.as_str()],
            )
            .await?;
        Ok(rows.iter().map(|r| r.get::<String, _>("TABLE_NAME")).collect())
    }

    async fn columns(&self, table: &str) -> Result<Vec<Column>> {
        let db = self.current_database().await?;
        // CAST string columns to CHAR and numeric to SIGNED to handle type differences
        let sql = format!(
            r#"
            SELECT
                CAST(COLUMN_NAME AS CHAR(255)) AS COLUMN_NAME,
                CAST(ORDINAL_POSITION AS SIGNED) AS ORDINAL_POSITION,
                CAST(COLUMN_DEFAULT AS CHAR) AS COLUMN_DEFAULT,
                IF(IS_NULLABLE = 'YES', 1, 0) AS is_nullable,
                CAST(DATA_TYPE AS CHAR(255)) AS DATA_TYPE,
                CAST(NUMERIC_PRECISION AS SIGNED) AS NUMERIC_PRECISION,
                CAST(NUMERIC_SCALE AS SIGNED) AS NUMERIC_SCALE,
                CAST(COLUMN_COMMENT AS CHAR) AS COLUMN_COMMENT,
                {} AS is_generated,
                CAST(GENERATION_EXPRESSION AS CHAR) AS GENERATION_EXPRESSION
            FROM INFORMATION_SCHEMA.COLUMNS
            WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ?
            ORDER BY ORDINAL_POSITION
            "#,
            self.generated_expr()
        );
        let rows = self
            .catalog_rows("loading MySQL columns", &sql, &[db.as_str(), table])
            .await?;

        let columns = rows
            .iter()
            .map(|row| {
                let is_generated = row.get::<i64, _>("is_generated") == 1;
                let expression: Option<String> = row.get("GENERATION_EXPRESSION");
                Column {
                    name: row.get("COLUMN_NAME"),
                    position: row.get::<i64, _>("ORDINAL_POSITION").max(0) as u32,
                    default_value: row.get("COLUMN_DEFAULT"),
                    is_nullable: row.get::<i64, _>("is_nullable") == 1,
                    data_type: row.get("DATA_TYPE"),
                    numeric_precision: row
                        .get::<Option<i64>, _>("NUMERIC_PRECISION")
                        .map(|v| v.max(0) as u32),
                    numeric_scale: row
                        .get::<Option<i64>, _>("NUMERIC_SCALE")
                        .map(|v| v.max(0) as u32),
                    comment: row
                        .get::<Option<String>, _>("COLUMN_COMMENT")
                        .unwrap_or_default(),
                    is_generated,
                    generation_expression: expression.filter(|e| is_generated && !e.is_empty()),
                }
            })
            .collect();
        Ok(columns)
    }

    async fn primary_key(&self, table: &str) -> Result<Vec<String>> {
        let db = self.current_database().await?;
        let rows = self
            .catalog_rows(
                "loading MySQL primary key",
                r#"
                SELECT CAST(COLUMN_NAME AS CHAR(255)) AS COLUMN_NAME
                FROM INFORMATION_SCHEMA.KEY_COLUMN_USAGE
                WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ? AND CONSTRAINT_NAME = 'PRIMARY'
                ORDER BY ORDINAL_POSITION
                "#,
                &[db.as_str(), table],
            )
            .await?;
        Ok(rows.iter().map(|r| r.get::<String, _>("COLUMN_NAME")).collect())
    }

    async fn foreign_keys(&self, table: &str) -> Result<Vec<ForeignKey>> {
        let db = self.current_database().await?;
        let rows = self
            .catalog_rows(
                "loading MySQL foreign keys",
                r#"
                SELECT
                    CAST(CONSTRAINT_SCHEMA AS CHAR(255)) AS CONSTRAINT_SCHEMA,
                    CAST(CONSTRAINT_NAME AS CHAR(255)) AS CONSTRAINT_NAME,
                    CAST(TABLE_SCHEMA AS CHAR(255)) AS TABLE_SCHEMA,
                    CAST(TABLE_NAME AS CHAR(255)) AS TABLE_NAME,
                    CAST(COLUMN_NAME AS CHAR(255)) AS COLUMN_NAME,
                    CAST(REFERENCED_TABLE_SCHEMA AS CHAR(255)) AS REFERENCED_TABLE_SCHEMA,
                    CAST(REFERENCED_TABLE_NAME AS CHAR(255)) AS REFERENCED_TABLE_NAME,
                    CAST(REFERENCED_COLUMN_NAME AS CHAR(255)) AS REFERENCED_COLUMN_NAME
                FROM INFORMATION_SCHEMA.KEY_COLUMN_USAGE
                WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ? AND REFERENCED_TABLE_NAME IS NOT NULL
                ORDER BY CONSTRAINT_NAME, ORDINAL_POSITION
                "#,
                &[db.as_str(), table],
            )
            .await?;

        let mut keys: Vec<ForeignKey> = Vec::new();
        for row in &rows {
            let name: String = row.get("CONSTRAINT_NAME");
            let column: String = row.get("COLUMN_NAME");
            let referenced: String = row.get("REFERENCED_COLUMN_NAME");
            match keys.last_mut() {
                Some(fk) if fk.name == name => {
                    fk.column_names.push(column);
                    fk.referenced_columns.push(referenced);
                }
                _ => keys.push(ForeignKey {
                    schema: row.get("CONSTRAINT_SCHEMA"),
                    name,
                    table_schema: row.get("TABLE_SCHEMA"),
                    table_name: row.get("TABLE_NAME"),
                    column_names: vec![column],
                    referenced_schema: row.get("REFERENCED_TABLE_SCHEMA"),
                    referenced_table: row.get("REFERENCED_TABLE_NAME"),
                    referenced_columns: vec![referenced],
                }),
            }
        }
        Ok(keys)
    }
}
