//! SQL text construction shared by every dialect.
//!
//! - [`condition`]: lexicographic offset conditions over composite keys
//! - [`params`]: named-parameter queries and driver-specific rendering
//! - [`queries`]: the data-provider queries, built once for all dialects
//! - [`text`]: statement normalization

pub mod condition;
pub mod params;
pub mod queries;
pub mod text;

pub use condition::{range_condition, BuiltCondition, CmpOp, Condition, OffsetConditionBuilder};
pub use params::{BoundQuery, ParamStyle, RenderedQuery};
pub use text::{normalize_standard_statement, normalize_statement};
