//! MySQL/MariaDB SQL dialect (Strategy pattern).
//!
//! Backtick quoting, `ON DUPLICATE KEY UPDATE` upserts, single-row
//! `UPDATE`/`DELETE` bounded by `LIMIT 1`, and foreign-key checks switched
//! off for the duration of a table sync.

use crate::core::key::KeyTuple;
use crate::core::schema::Table;
use crate::core::traits::Dialect;
use crate::core::value::{hex, Row, SqlValue};
use crate::drivers::common::version::{unparsable, ServerVersion};
use crate::error::{Result, SyncError};
use crate::sql::params::ParamStyle;
use crate::sql::text::normalize_statement;

/// Oldest supported MySQL server.
pub const MYSQL_MIN_VERSION: ServerVersion = ServerVersion::new(8, 0, 0);

/// Oldest supported MariaDB server.
pub const MARIADB_MIN_VERSION: ServerVersion = ServerVersion::new(10, 2, 3);

/// Which server family the dialect talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MysqlFlavor {
    Mysql,
    MariaDb,
}

/// MySQL/MariaDB dialect implementation.
#[derive(Debug, Clone)]
pub struct MysqlDialect {
    flavor: MysqlFlavor,
}

impl MysqlDialect {
    pub fn new(flavor: MysqlFlavor) -> Self {
        Self { flavor }
    }

    pub fn mysql() -> Self {
        Self::new(MysqlFlavor::Mysql)
    }

    pub fn mariadb() -> Self {
        Self::new(MysqlFlavor::MariaDb)
    }

    pub fn flavor(&self) -> MysqlFlavor {
        self.flavor
    }

    /// Validate a `SELECT VERSION()` result against the flavor's minimum.
    pub fn check_version(&self, raw: &str) -> Result<ServerVersion> {
        let is_mariadb = raw.contains("MariaDB");
        match self.flavor {
            MysqlFlavor::Mysql => {
                if is_mariadb {
                    return Err(SyncError::UnsupportedVersion {
                        engine: "MySQL".into(),
                        version: raw.to_string(),
                        reason: "server is MariaDB; configure type: mariadb".into(),
                    });
                }
                let version =
                    ServerVersion::parse_leading(raw).ok_or_else(|| unparsable("MySQL", raw))?;
                version.require_at_least(MYSQL_MIN_VERSION, "MySQL", raw)?;
                Ok(version)
            }
            MysqlFlavor::MariaDb => {
                if !is_mariadb {
                    return Err(unparsable("MariaDB", raw));
                }
                // Replication-compatible servers report `5.5.5-10.x.y-MariaDB`.
                let trimmed = raw.strip_prefix("5.5.5-").unwrap_or(raw);
                let version = ServerVersion::parse_leading(trimmed)
                    .ok_or_else(|| unparsable("MariaDB", raw))?;
                version.require_at_least(MARIADB_MIN_VERSION, "MariaDB", raw)?;
                Ok(version)
            }
        }
    }

    fn text_literal(s: &str) -> String {
        let mut out = String::with_capacity(s.len() + 2);
        out.push('\'');
        for ch in s.chars() {
            match ch {
                '\'' => out.push_str("\\'"),
                '\\' => out.push_str("\\\\"),
                '\0' => out.push_str("\\0"),
                '\n' => out.push_str("\\n"),
                '\r' => out.push_str("\\r"),
                '\x1a' => out.push_str("\\Z"),
                c => out.push(c),
            }
        }
        out.push('\'');
        out
    }

    fn assignments(&self, values: &Row) -> String {
        values
            .iter()
            .map(|(name, value)| format!("{} = {}", self.quote_ident(name), self.quote_value(value)))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl Dialect for MysqlDialect {
    fn name(&self) -> &str {
        match self.flavor {
            MysqlFlavor::Mysql => "mysql",
            MysqlFlavor::MariaDb => "mariadb",
        }
    }

    fn quote_ident(&self, name: &str) -> String {
        format!("`{}`", name.replace('`', "``"))
    }

    fn quote_table(&self, name: &str) -> String {
        self.quote_ident(name)
    }

    fn quote_value(&self, value: &SqlValue) -> String {
        match value {
            SqlValue::Null => "NULL".to_string(),
            SqlValue::Bool(b) => if *b { "1" } else { "0" }.to_string(),
            SqlValue::Int(v) => v.to_string(),
            SqlValue::UInt(v) => v.to_string(),
            SqlValue::Float(v) if v.is_finite() => v.to_string(),
            SqlValue::Float(_) => "NULL".to_string(),
            SqlValue::Decimal(v) => v.to_string(),
            SqlValue::Bytes(b) => format!("X'{}'", &hex(b)[2..]),
            other => Self::text_literal(&other.compare_string().unwrap_or_default()),
        }
    }

    fn param_style(&self) -> ParamStyle {
        ParamStyle::Positional
    }

    fn fingerprint_expr(&self, value_fields: &[String], alias: Option<&str>) -> String {
        if value_fields.is_empty() {
            return "MD5('')".to_string();
        }
        let parts: Vec<String> = value_fields
            .iter()
            .map(|f| {
                let text = format!("CAST({} AS CHAR)", self.quote_field(f, alias));
                format!(
                    "COALESCE(CONCAT('V', CHAR_LENGTH({t}), ':', {t}), 'N')",
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
            .map(|n| format!("{c} = VALUES({c})", c = self.quote_ident(n)))
            .collect();

        let sql = if updates.is_empty() {
            format!(
                "INSERT IGNORE INTO {} ({}) VALUES ({})",
                self.quote_table(&table.name),
                columns.join(", "),
                values.join(", ")
            )
        } else {
            format!(
                "INSERT INTO {} ({}) VALUES ({}) ON DUPLICATE KEY UPDATE {}",
                self.quote_table(&table.name),
                columns.join(", "),
                values.join(", "),
                updates.join(", ")
            )
        };
        Ok(normalize_statement(&sql))
    }

    fn make_update(&self, table: &Table, values: &Row, key: &KeyTuple) -> Result<String> {
        if values.is_empty() || key.is_empty() {
            return Err(SyncError::write(&table.name, "update needs values and a key"));
        }
        let sql = format!(
            "UPDATE {} SET {} WHERE {} LIMIT 1",
            self.quote_table(&table.name),
            self.assignments(values),
            self.key_equals(key, None)
        );
        Ok(normalize_statement(&sql))
    }

    fn make_delete(&self, table: &Table, key: &KeyTuple) -> Result<String> {
        if key.is_empty() {
            return Err(SyncError::write(&table.name, "delete needs a key"));
        }
        let sql = format!(
            "DELETE FROM {} WHERE {} LIMIT 1",
            self.quote_table(&table.name),
            self.key_equals(key, None)
        );
        Ok(normalize_statement(&sql))
    }

    fn set_up(&self) -> Vec<String> {
        vec![normalize_statement("SET FOREIGN_KEY_CHECKS=0")]
    }

    fn tear_down(&self) -> Vec<String> {
        vec![normalize_statement("SET FOREIGN_KEY_CHECKS=1")]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schema::Column;

    fn table() -> Table {
        Table::new("shop", "items")
            .with_column(Column::new("id", "int"))
            .with_column(Column::new("name", "varchar"))
            .with_column(Column::new("price", "decimal"))
            .with_primary_key(["id"])
    }

    #[test]
    fn test_quote_ident_and_field() {
        let d = MysqlDialect::mysql();
        assert_eq!(d.quote_ident("weird`name"), "`weird``name`");
        assert_eq!(d.quote_field("id", Some("a")), "`a`.`id`");
    }

    #[test]
    fn test_quote_value() {
        let d = MysqlDialect::mysql();
        assert_eq!(d.quote_value(&SqlValue::Null), "NULL");
        assert_eq!(d.quote_value(&SqlValue::Bool(true)), "1");
        assert_eq!(d.quote_value(&SqlValue::Int(-5)), "-5");
        assert_eq!(d.quote_value(&SqlValue::Text("it's\\".into())), "'it\\'s\\\\'");
        assert_eq!(d.quote_value(&SqlValue::Bytes(vec![0xab, 0x01])), "X'ab01'");
        assert_eq!(d.quote_value(&SqlValue::Float(f64::NAN)), "NULL");
    }

    #[test]
    fn test_make_insert_is_upsert() {
        let d = MysqlDialect::mysql();
        let row = Row::new().with("id", 3).with("name", "c").with("price", SqlValue::Null);
        assert_eq!(
            d.make_insert(&table(), &row).unwrap(),
            "INSERT INTO `items` (`id`, `name`, `price`) VALUES (3, 'c', NULL) \
             ON DUPLICATE KEY UPDATE `name` = VALUES(`name`), `price` = VALUES(`price`);"
        );
    }

    #[test]
    fn test_make_insert_key_only_table() {
        let d = MysqlDialect::mysql();
        let t = Table::new("s", "tags")
            .with_column(Column::new("tag", "varchar"))
            .with_primary_key(["tag"]);
        let row = Row::new().with("tag", "x");
        assert_eq!(
            d.make_insert(&t, &row).unwrap(),
            "INSERT IGNORE INTO `tags` (`tag`) VALUES ('x');"
        );
    }

    #[test]
    fn test_make_update_and_delete_are_single_row() {
        let d = MysqlDialect::mysql();
        let key = KeyTuple::from_pairs([("id", 2)]);
        let values = Row::new().with("name", "b");
        assert_eq!(
            d.make_update(&table(), &values, &key).unwrap(),
            "UPDATE `items` SET `name` = 'b' WHERE `id` = 2 LIMIT 1;"
        );
        assert_eq!(
            d.make_delete(&table(), &key).unwrap(),
            "DELETE FROM `items` WHERE `id` = 2 LIMIT 1;"
        );
        assert!(d.make_update(&table(), &Row::new(), &key).is_err());
    }

    #[test]
    fn test_hooks() {
        let d = MysqlDialect::mariadb();
        assert_eq!(d.set_up(), vec!["SET FOREIGN_KEY_CHECKS=0;"]);
        assert_eq!(d.tear_down(), vec!["SET FOREIGN_KEY_CHECKS=1;"]);
    }

    #[test]
    fn test_fingerprint_expr() {
        let d = MysqlDialect::mysql();
        assert_eq!(
            d.fingerprint_expr(&["v".to_string()], Some("a")),
            "MD5(CONCAT(COALESCE(CONCAT('V', CHAR_LENGTH(CAST(`a`.`v` AS CHAR)), ':', \
             CAST(`a`.`v` AS CHAR)), 'N')))"
        );
        assert_eq!(d.fingerprint_expr(&[], None), "MD5('')");
    }

    #[test]
    fn test_version_checks() {
        let mysql = MysqlDialect::mysql();
        assert_eq!(mysql.check_version("8.0.36-28").unwrap(), ServerVersion::new(8, 0, 36));
        assert!(mysql.check_version("5.7.44-log").is_err());
        assert!(mysql.check_version("10.6.12-MariaDB").is_err());
        assert!(mysql.check_version("not a version").is_err());

        let maria = MysqlDialect::mariadb();
        assert_eq!(
            maria.check_version("10.6.12-MariaDB-1:10.6.12+maria~ubu2004").unwrap(),
            ServerVersion::new(10, 6, 12)
        );
        assert_eq!(
            maria.check_version("5.5.5-10.4.8-MariaDB").unwrap(),
            ServerVersion::new(10, 4, 8)
        );
        assert!(maria.check_version("10.2.2-MariaDB").is_err());
        assert!(maria.check_version("8.0.36").is_err());
    }
}
