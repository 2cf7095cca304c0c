//! The table sync algorithm.
//!
//! - [`window`]: picks window bounds that keep both sides under the row limit
//! - [`compare`]: splits a window's keys and diffs fingerprints and fields
//! - [`change`]: change records and the sinks that apply or collect them
//! - [`table`]: the per-table state machine tying the above together

pub mod change;
pub mod compare;
pub mod table;
pub mod window;

pub use change::{Change, ChangeSink, CollectingSink, ExecutingSink, Intent, Statement};
pub use compare::{
    field_delta, full_delta, get_keys_with_differences_in_values, partition_keys, FieldChange,
    FieldDelta, KeyPartition,
};
pub use table::{RowFilter, Side, TableSync, TableSyncResult, DEFAULT_WINDOW_SIZE};
pub use window::find_nearest_upper_bound_with_max_n_rows;
