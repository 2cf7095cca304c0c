//! Table, column and foreign-key descriptors.
//!
//! These are produced by the catalog side of each engine and consumed by the
//! sync algorithm. Foreign keys are informational only.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::key::KeyTuple;
use super::value::Row;
use crate::error::{Result, SyncError};

/// Column metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    /// 1-based ordinal position.
    pub position: u32,
    pub default_value: Option<String>,
    pub is_nullable: bool,
    pub data_type: String,
    pub numeric_precision: Option<u32>,
    pub numeric_scale: Option<u32>,
    pub comment: String,
    /// Engine-computed column; never written or hashed.
    pub is_generated: bool,
    pub generation_expression: Option<String>,
}

impl Column {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            is_nullable: true,
            ..Default::default()
        }
    }

    pub fn not_null(mut self) -> Self {
        self.is_nullable = false;
        self
    }

    pub fn generated(mut self, expression: impl Into<String>) -> Self {
        self.is_generated = true;
        self.generation_expression = Some(expression.into());
        self
    }
}

/// Foreign key metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ForeignKey {
    pub schema: String,
    pub name: String,
    pub table_schema: String,
    pub table_name: String,
    pub column_names: Vec<String>,
    pub referenced_schema: String,
    pub referenced_table: String,
    pub referenced_columns: Vec<String>,
}

/// Table descriptor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub schema: String,
    pub name: String,
    pub columns: Vec<Column>,
    /// Primary-key field names in key order. This order defines pagination.
    pub primary_key: Vec<String>,
    pub foreign_keys: Vec<ForeignKey>,
}

impl Table {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_column(mut self, mut column: Column) -> Self {
        if column.position == 0 {
            column.position = self.columns.len() as u32 + 1;
        }
        self.columns.push(column);
        self
    }

    pub fn with_primary_key<S: Into<String>>(mut self, fields: impl IntoIterator<Item = S>) -> Self {
        self.primary_key = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_primary_key(&self) -> bool {
        !self.primary_key.is_empty()
    }

    fn is_key(&self, name: &str) -> bool {
        self.primary_key.iter().any(|k| k == name)
    }

    /// Check that the table can be synchronized: it has a primary key and
    /// every key field is a known column.
    pub fn validate(&self) -> Result<()> {
        if !self.has_primary_key() {
            return Err(SyncError::NoPrimaryKey(self.name.clone()));
        }
        if let Some(missing) = self.primary_key.iter().find(|k| self.column(k).is_none()) {
            return Err(SyncError::Config(format!(
                "primary key field '{}' is not a column of table {}",
                missing, self.name
            )));
        }
        Ok(())
    }

    /// Key fields (in key order) and value fields (non-key, non-generated,
    /// in column order).
    pub fn key_and_value_fields(&self) -> (Vec<String>, Vec<String>) {
        (self.primary_key.clone(), self.non_primary_column_names())
    }

    /// Columns that are neither part of the primary key nor generated.
    pub fn non_primary_column_names(&self) -> Vec<String> {
        self.columns
            .iter()
            .filter(|c| !c.is_generated && !self.is_key(&c.name))
            .map(|c| c.name.clone())
            .collect()
    }

    /// Every column a statement may write: all non-generated columns.
    pub fn writable_columns(&self) -> Vec<String> {
        self.columns
            .iter()
            .filter(|c| !c.is_generated)
            .map(|c| c.name.clone())
            .collect()
    }

    pub fn only_primary_keys(&self, row: &Row) -> Row {
        row.only(&self.primary_key)
    }

    pub fn only_non_primary_keys(&self, row: &Row) -> Row {
        row.only(&self.non_primary_column_names())
    }

    /// Canonical key of a row, used to pair up rows fetched from both sides.
    pub fn primary_key_hash(&self, row: &Row) -> Result<String> {
        Ok(KeyTuple::from_row(row, &self.primary_key)?.canonical())
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "TABLE {} {{", self.name)?;
        for column in &self.columns {
            write!(f, "\tCOLUMN {} {}", column.name, column.data_type)?;
            if !column.is_nullable {
                f.write_str(" NOT NULL")?;
            }
            if let Some(expr) = &column.generation_expression {
                write!(f, " GENERATED ({})", expr)?;
            }
            writeln!(f)?;
        }
        if self.has_primary_key() {
            writeln!(f, "\tPRIMARY KEY ({})", self.primary_key.join(", "))?;
        }
        for fk in &self.foreign_keys {
            writeln!(
                f,
                "\tFOREIGN KEY {}.{} ({}) REFERENCES {}.{} ({})",
                fk.schema,
                fk.name,
                fk.column_names.join(", "),
                fk.referenced_schema,
                fk.referenced_table,
                fk.referenced_columns.join(", ")
            )?;
        }
        f.write_str("}")
    }
}
