//! Named-parameter queries and their rendering into driver styles.
//!
//! Queries are written once with `:name` placeholders. MySQL and MariaDB
//! receive positional `?` binds through sqlx; PostgreSQL receives inline
//! literals, because a generic key value has no single Rust type that
//! tokio-postgres would accept for every column type.

use crate::core::key::KeyValue;
use crate::core::traits::Dialect;
use crate::error::{Result, SyncError};

/// How a driver receives bound values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamStyle {
    /// `?` placeholders, one bind per occurrence.
    Positional,
    /// Values quoted into the statement text.
    Inline,
}

/// SQL text with `:name` placeholders and their values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoundQuery {
    pub sql: String,
    pub params: Vec<(String, KeyValue)>,
}

/// A query ready for a specific driver.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedQuery {
    pub sql: String,
    /// Values for positional placeholders, in order. Empty for inline style.
    pub binds: Vec<KeyValue>,
}

impl BoundQuery {
    pub fn new(sql: impl Into<String>, params: Vec<(String, KeyValue)>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }

    fn lookup(&self, name: &str) -> Result<&KeyValue> {
        self.params
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
            .ok_or_else(|| SyncError::Config(format!("unbound query parameter :{}", name)))
    }

    /// Rewrite placeholders outside quoted literals for `dialect`.
    /// `::` casts are left untouched.
    pub fn render(&self, dialect: &dyn Dialect) -> Result<RenderedQuery> {
        let style = dialect.param_style();
        let chars: Vec<char> = self.sql.chars().collect();
        let mut sql = String::with_capacity(self.sql.len());
        let mut binds = Vec::new();
        let mut quote: Option<char> = None;
        let mut i = 0;

        while i < chars.len() {
            let ch = chars[i];
            if let Some(q) = quote {
                sql.push(ch);
                if ch == '\\' && i + 1 < chars.len() {
                    sql.push(chars[i + 1]);
                    i += 2;
                    continue;
                }
                if ch == q {
                    quote = None;
                }
                i += 1;
                continue;
            }

            if matches!(ch, '\'' | '"' | '`') {
                quote = Some(ch);
                sql.push(ch);
                i += 1;
                continue;
            }

            let prev_colon = i > 0 && chars[i - 1] == ':';
            let starts_name = chars
                .get(i + 1)
                .map(|c| c.is_ascii_alphabetic() || *c == '_')
                .unwrap_or(false);
            if ch == ':' && !prev_colon && starts_name {
                let start = i + 1;
                let mut end = start;
                while end < chars.len() && (chars[end].is_ascii_alphanumeric() || chars[end] == '_')
                {
                    end += 1;
                }
                let name: String = chars[start..end].iter().collect();
                let value = self.lookup(&name)?;
                match style {
                    ParamStyle::Positional => {
                        sql.push('?');
                        binds.push(value.clone());
                    }
                    ParamStyle::Inline => sql.push_str(&dialect.quote_value(&value.to_sql())),
                }
                i = end;
                continue;
            }

            sql.push(ch);
            i += 1;
        }

        Ok(RenderedQuery { sql, binds })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::mysql::MysqlDialect;
    use crate::drivers::postgres::PostgresDialect;

    fn query() -> BoundQuery {
        BoundQuery::new(
            "SELECT a FROM t WHERE a > :p0 OR a = :p0 AND b::text <= :p1 AND c = ':p9'",
            vec![
                ("p0".to_string(), KeyValue::Int(5)),
                ("p1".to_string(), KeyValue::Text("o'k".into())),
            ],
        )
    }

    #[test]
    fn test_positional_binds_every_occurrence() {
        let rendered = query().render(&MysqlDialect::mysql()).unwrap();
        assert_eq!(
            rendered.sql,
            "SELECT a FROM t WHERE a > ? OR a = ? AND b::text <= ? AND c = ':p9'"
        );
        assert_eq!(
            rendered.binds,
            vec![KeyValue::Int(5), KeyValue::Int(5), KeyValue::Text("o'k".into())]
        );
    }

    #[test]
    fn test_inline_quotes_values() {
        let rendered = query().render(&PostgresDialect::new("public")).unwrap();
        assert_eq!(
            rendered.sql,
            "SELECT a FROM t WHERE a > 5 OR a = 5 AND b::text <= 'o''k' AND c = ':p9'"
        );
        assert!(rendered.binds.is_empty());
    }

    #[test]
    fn test_unbound_parameter_is_an_error() {
        let q = BoundQuery::new("SELECT :missing", vec![]);
        assert!(q.render(&MysqlDialect::mysql()).is_err());
    }
}
