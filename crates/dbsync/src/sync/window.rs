//! Window sizing across two providers.
//!
//! The upper bound of the next window is taken from the first provider and
//! tightened whenever the second provider holds more rows in the same key
//! range, so a window never pulls unbounded rows from the denser side.

use tracing::debug;

use crate::core::key::KeyTuple;
use crate::core::traits::DataProvider;
use crate::error::{Result, SyncError};

/// Upper key bound of the next window after `offset`, or `None` when both
/// providers have no rows left.
///
/// Each side holds at most `limit` rows in `(offset, bound]`. When the
/// first side is exhausted but the second still has rows, the window is
/// sized off the second side so its surplus rows are still visited.
pub async fn find_nearest_upper_bound_with_max_n_rows<A, B>(
    first: &A,
    second: &B,
    table: &str,
    key_fields: &[String],
    limit: usize,
    offset: Option<&KeyTuple>,
) -> Result<Option<KeyTuple>>
where
    A: DataProvider + ?Sized,
    B: DataProvider + ?Sized,
{
    let limit = limit.max(1);

    let Some(candidate) = first
        .greatest_key_at_limit(table, key_fields, limit, offset)
        .await?
    else {
        let (first_rows, second_rows) = tokio::try_join!(
            first.row_count_in_range(table, key_fields, offset, None),
            second.row_count_in_range(table, key_fields, offset, None),
        )?;
        if first_rows == 0 && second_rows == 0 {
            return Ok(None);
        }
        if first_rows == 0 {
            debug!(
                "{}: first side exhausted, {} rows remain on second side",
                table, second_rows
            );
            if let Some(bound) = second
                .greatest_key_at_limit(table, key_fields, limit, offset)
                .await?
            {
                return Ok(Some(bound));
            }
        }
        return Err(inconsistent(table, offset, first_rows, second_rows));
    };

    let second_rows = second
        .row_count_in_range(table, key_fields, offset, Some(&candidate))
        .await?;
    if second_rows as usize <= limit {
        return Ok(Some(candidate));
    }

    // Second side is denser in this range; size the window off it instead.
    debug!(
        "{}: {} rows on second side up to {}, tightening window",
        table, second_rows, candidate
    );
    match second
        .greatest_key_at_limit(table, key_fields, limit, offset)
        .await?
    {
        Some(bound) => Ok(Some(bound)),
        None => Err(inconsistent(table, offset, limit as u64, second_rows)),
    }
}

fn inconsistent(table: &str, offset: Option<&KeyTuple>, first: u64, second: u64) -> SyncError {
    SyncError::InconsistentWindow {
        table: table.to_string(),
        offset: offset
            .map(|o| o.to_string())
            .unwrap_or_else(|| "null".to_string()),
        source_rows: first,
        dest_rows: second,
    }
}
