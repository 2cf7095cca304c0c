//! Core abstractions for engine-agnostic synchronization.
//!
//! - [`schema`]: table, column and foreign-key descriptors
//! - [`value`]: owned cell values and rows
//! - [`key`]: primary-key values and tuples with string-normalized equality
//! - [`traits`]: dialect, data provider, catalog and executor seams
//!
//! Driver modules (`drivers/mysql`, `drivers/postgres`) implement the traits;
//! the sync algorithm in [`crate::sync`] only ever sees the traits.

pub mod key;
pub mod schema;
pub mod traits;
pub mod value;

pub use key::{KeyTuple, KeyValue};
pub use schema::{Column, ForeignKey, Table};
pub use traits::{
    DataProvider, DbEngine, Dialect, Fingerprint, FingerprintMap, RowStream, StatementExecutor,
    TableProvider,
};
pub use value::{Row, SqlValue};
