//! Primary-key values and tuples.
//!
//! Key tuples are used both as scan boundaries and as row identities. Two
//! tuples are equal when all their values match under string-normalized
//! comparison, which lets an integer key read from one driver match the
//! numeric-string key read from another.

use std::cmp::Ordering;
use std::fmt;

use super::value::{json_str, Row, SqlValue};
use crate::error::{Result, SyncError};

/// A scalar primary-key value.
#[derive(Debug, Clone)]
pub enum KeyValue {
    Int(i64),
    Float(f64),
    Text(String),
}

impl KeyValue {
    /// String-normalized form used for equality and canonical serialization.
    pub fn as_string(&self) -> String {
        match self {
            KeyValue::Int(v) => v.to_string(),
            KeyValue::Float(v) => v.to_string(),
            KeyValue::Text(v) => v.clone(),
        }
    }

    /// Convert a cell value into a key value. NULL and structured values
    /// are not valid key components.
    pub fn from_sql(value: &SqlValue) -> Option<Self> {
        match value {
            SqlValue::Null | SqlValue::Json(_) => None,
            SqlValue::Bool(b) => Some(KeyValue::Int(i64::from(*b))),
            SqlValue::Int(v) => Some(KeyValue::Int(*v)),
            SqlValue::UInt(v) => Some(match i64::try_from(*v) {
                Ok(i) => KeyValue::Int(i),
                Err(_) => KeyValue::Text(v.to_string()),
            }),
            SqlValue::Float(v) => Some(KeyValue::Float(*v)),
            SqlValue::Text(v) => Some(KeyValue::Text(v.clone())),
            SqlValue::Bytes(b) => Some(KeyValue::Text(String::from_utf8_lossy(b).into_owned())),
            other => other.compare_string().map(KeyValue::Text),
        }
    }

    pub fn to_sql(&self) -> SqlValue {
        match self {
            KeyValue::Int(v) => SqlValue::Int(*v),
            KeyValue::Float(v) => SqlValue::Float(*v),
            KeyValue::Text(v) => SqlValue::Text(v.clone()),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        self.to_sql().to_json()
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            KeyValue::Int(v) => Some(*v as f64),
            KeyValue::Float(v) => Some(*v),
            KeyValue::Text(_) => None,
        }
    }
}

impl Ord for KeyValue {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (KeyValue::Int(a), KeyValue::Int(b)) => a.cmp(b),
            (KeyValue::Text(a), KeyValue::Text(b)) => a.cmp(b),
            _ => match (self.as_f64(), other.as_f64()) {
                (Some(a), Some(b)) => a.total_cmp(&b),
                _ => self.as_string().cmp(&other.as_string()),
            },
        }
    }
}

impl PartialOrd for KeyValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for KeyValue {
    fn eq(&self, other: &Self) -> bool {
        self.as_string() == other.as_string()
    }
}

impl Eq for KeyValue {}

impl From<i64> for KeyValue {
    fn from(v: i64) -> Self {
        KeyValue::Int(v)
    }
}

impl From<i32> for KeyValue {
    fn from(v: i32) -> Self {
        KeyValue::Int(i64::from(v))
    }
}

impl From<f64> for KeyValue {
    fn from(v: f64) -> Self {
        KeyValue::Float(v)
    }
}

impl From<&str> for KeyValue {
    fn from(v: &str) -> Self {
        KeyValue::Text(v.to_string())
    }
}

impl From<String> for KeyValue {
    fn from(v: String) -> Self {
        KeyValue::Text(v)
    }
}

/// Ordered mapping of key-field name to key value.
#[derive(Debug, Clone, Default)]
pub struct KeyTuple {
    fields: Vec<(String, KeyValue)>,
}

impl KeyTuple {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from `(field, value)` pairs, keeping their order.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<KeyValue>,
    {
        Self {
            fields: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Extract the key tuple for `key_fields` from a row.
    pub fn from_row(row: &Row, key_fields: &[String]) -> Result<Self> {
        let mut fields = Vec::with_capacity(key_fields.len());
        for field in key_fields {
            let value = row
                .get(field)
                .and_then(KeyValue::from_sql)
                .ok_or_else(|| {
                    SyncError::Config(format!(
                        "key field '{}' is missing, NULL or not a scalar",
                        field
                    ))
                })?;
            fields.push((field.clone(), value));
        }
        Ok(Self { fields })
    }

    pub fn push(&mut self, field: impl Into<String>, value: impl Into<KeyValue>) {
        self.fields.push((field.into(), value.into()));
    }

    pub fn get(&self, field: &str) -> Option<&KeyValue> {
        self.fields.iter().find(|(f, _)| f == field).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &KeyValue)> {
        self.fields.iter().map(|(f, v)| (f.as_str(), v))
    }

    pub fn values(&self) -> impl Iterator<Item = &KeyValue> {
        self.fields.iter().map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Canonical lookup key: a JSON object of string-normalized values in
    /// key-field order. `{"id":1}` and `{"id":"1"}` share one canonical form.
    pub fn canonical(&self) -> String {
        let body: Vec<String> = self
            .fields
            .iter()
            .map(|(f, v)| format!("{}:{}", json_str(f), json_str(&v.as_string())))
            .collect();
        format!("{{{}}}", body.join(","))
    }

    /// Key as a row, for statement generation.
    pub fn to_row(&self) -> Row {
        self.fields
            .iter()
            .map(|(f, v)| (f.clone(), v.to_sql()))
            .collect()
    }
}

impl Ord for KeyTuple {
    fn cmp(&self, other: &Self) -> Ordering {
        for (a, b) in self.values().zip(other.values()) {
            match a.cmp(b) {
                Ordering::Equal => continue,
                non_eq => return non_eq,
            }
        }
        self.len().cmp(&other.len())
    }
}

impl PartialOrd for KeyTuple {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for KeyTuple {
    fn eq(&self, other: &Self) -> bool {
        self.canonical() == other.canonical()
    }
}

impl Eq for KeyTuple {}

/// Typed JSON object in key-field order, as shown in log lines.
impl fmt::Display for KeyTuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (field, value)) in self.fields.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}:{}", json_str(field), value.to_json())?;
        }
        f.write_str("}")
    }
}
