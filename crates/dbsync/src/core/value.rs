//! SQL value and row types shared by every engine.
//!
//! Values are always owned: rows only live for the duration of one window,
//! so there is no source buffer worth borrowing from.

use std::fmt;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use uuid::Uuid;

use super::key::KeyTuple;
use crate::error::{Result, SyncError};

/// Maximum number of characters shown per value in change log lines.
pub const DISPLAY_VALUE_LIMIT: usize = 32;

/// A single cell value as read from either connection.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Decimal(Decimal),
    Text(String),
    Bytes(Vec<u8>),
    Date(NaiveDate),
    Time(NaiveTime),
    DateTime(NaiveDateTime),
    DateTimeTz(DateTime<FixedOffset>),
    Uuid(Uuid),
    Json(serde_json::Value),
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// Normalized text form used for field-level comparison.
    ///
    /// Two values from different drivers are considered equal when their
    /// comparison strings match, so an `Int(1)` read from MySQL equals a
    /// `Decimal(1)` read from PostgreSQL. `None` means SQL NULL.
    pub fn compare_string(&self) -> Option<String> {
        let s = match self {
            SqlValue::Null => return None,
            SqlValue::Bool(b) => if *b { "1" } else { "0" }.to_string(),
            SqlValue::Int(v) => v.to_string(),
            SqlValue::UInt(v) => v.to_string(),
            SqlValue::Float(v) => v.to_string(),
            SqlValue::Decimal(v) => v.to_string(),
            SqlValue::Text(v) => v.clone(),
            SqlValue::Bytes(v) => hex(v),
            SqlValue::Date(v) => v.format("%Y-%m-%d").to_string(),
            SqlValue::Time(v) => v.format("%H:%M:%S%.f").to_string(),
            SqlValue::DateTime(v) => v.format("%Y-%m-%d %H:%M:%S%.f").to_string(),
            SqlValue::DateTimeTz(v) => v.to_rfc3339(),
            SqlValue::Uuid(v) => v.hyphenated().to_string(),
            SqlValue::Json(v) => v.to_string(),
        };
        Some(s)
    }

    /// Whether two values differ under string-normalized comparison.
    pub fn differs_from(&self, other: &SqlValue) -> bool {
        self.compare_string() != other.compare_string()
    }

    /// JSON rendering used in log lines.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value;
        match self {
            SqlValue::Null => Value::Null,
            SqlValue::Bool(b) => Value::Bool(*b),
            SqlValue::Int(v) => Value::from(*v),
            SqlValue::UInt(v) => Value::from(*v),
            SqlValue::Float(v) => serde_json::Number::from_f64(*v)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            SqlValue::Json(v) => v.clone(),
            other => Value::String(other.compare_string().unwrap_or_default()),
        }
    }

    /// JSON rendering truncated to [`DISPLAY_VALUE_LIMIT`] characters.
    pub fn display_truncated(&self) -> String {
        truncate_display(&self.to_json().to_string(), DISPLAY_VALUE_LIMIT)
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.compare_string() {
            Some(s) => f.write_str(&s),
            None => f.write_str("NULL"),
        }
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Int(v)
    }
}

impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        SqlValue::Int(i64::from(v))
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::Float(v)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(SqlValue::Null)
    }
}

/// Lowercase hex encoding, prefixed with `0x`.
pub(crate) fn hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(2 + bytes.len() * 2);
    out.push_str("0x");
    for b in bytes {
        out.push_str(&format!("{:02x}", b));
    }
    out
}

/// Cut `s` to at most `limit` characters, marking the cut with an ellipsis.
pub fn truncate_display(s: &str, limit: usize) -> String {
    if s.chars().count() <= limit {
        return s.to_string();
    }
    let mut out: String = s.chars().take(limit.saturating_sub(1)).collect();
    out.push('…');
    out
}

/// One table row: column names paired with values, in select order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    columns: Vec<(String, SqlValue)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(n: usize) -> Self {
        Self {
            columns: Vec::with_capacity(n),
        }
    }

    /// Builder-style push.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        self.push(name, value);
        self
    }

    /// Append a column, replacing an existing one with the same name.
    pub fn push(&mut self, name: impl Into<String>, value: impl Into<SqlValue>) {
        let name = name.into();
        let value = value.into();
        match self.columns.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.columns.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&SqlValue> {
        self.columns.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn columns(&self) -> &[(String, SqlValue)] {
        &self.columns
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SqlValue)> {
        self.columns.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(n, _)| n.as_str())
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Project the row onto `fields`, in the order given. Missing fields are skipped.
    pub fn only(&self, fields: &[String]) -> Row {
        let columns = fields
            .iter()
            .filter_map(|f| self.get(f).map(|v| (f.clone(), v.clone())))
            .collect();
        Row { columns }
    }

    /// Extract the key tuple for `key_fields`.
    pub fn key(&self, key_fields: &[String]) -> Result<KeyTuple> {
        KeyTuple::from_row(self, key_fields)
    }

    /// JSON object of the row, in column order.
    pub fn to_json_string(&self) -> String {
        let body: Vec<String> = self
            .columns
            .iter()
            .map(|(n, v)| format!("{}:{}", json_str(n), v.to_json()))
            .collect();
        format!("{{{}}}", body.join(","))
    }

    /// Fetch a value that must be present.
    pub fn require(&self, name: &str) -> Result<&SqlValue> {
        self.get(name)
            .ok_or_else(|| SyncError::Config(format!("row has no column '{}'", name)))
    }
}

impl FromIterator<(String, SqlValue)> for Row {
    fn from_iter<I: IntoIterator<Item = (String, SqlValue)>>(iter: I) -> Self {
        let mut row = Row::new();
        for (n, v) in iter {
            row.push(n, v);
        }
        row
    }
}

/// JSON-escape a string, quotes included.
pub(crate) fn json_str(s: &str) -> String {
    serde_json::Value::String(s.to_string()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_compare_string_crosses_driver_types() {
        let mysql = SqlValue::Int(42);
        let pg = SqlValue::Decimal(Decimal::from_str("42").unwrap());
        assert!(!mysql.differs_from(&pg));
        assert!(SqlValue::Null.differs_from(&SqlValue::Text(String::new())));
        assert!(!SqlValue::Null.differs_from(&SqlValue::Null));
    }

    #[test]
    fn test_display_truncated() {
        let long = SqlValue::Text("x".repeat(100));
        let shown = long.display_truncated();
        assert_eq!(shown.chars().count(), DISPLAY_VALUE_LIMIT);
        assert!(shown.ends_with('…'));
        assert_eq!(SqlValue::Text("b".into()).display_truncated(), "\"b\"");
        assert_eq!(SqlValue::Null.display_truncated(), "null");
    }

    #[test]
    fn test_row_projection_keeps_requested_order() {
        let row = Row::new().with("id", 1).with("a", "x").with("b", "y");
        let projected = row.only(&["b".to_string(), "id".to_string()]);
        let names: Vec<&str> = projected.names().collect();
        assert_eq!(names, vec!["b", "id"]);
        assert_eq!(row.to_json_string(), r#"{"id":1,"a":"x","b":"y"}"#);
    }

    #[test]
    fn test_bytes_hex() {
        assert_eq!(SqlValue::Bytes(vec![0xde, 0xad]).to_string(), "0xdead");
    }
}
