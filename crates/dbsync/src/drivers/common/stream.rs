//! Lazy row streaming in bounded sub-batches.
//!
//! A key set is fetched in chunks of [`ROW_FETCH_BATCH`] keys. Each chunk is
//! one query whose cursor is released before the next chunk starts, and
//! dropping the stream early stops issuing queries.

use std::future::Future;

use futures::stream::{self, StreamExt, TryStreamExt};

use crate::core::key::KeyTuple;
use crate::core::schema::Table;
use crate::core::traits::RowStream;
use crate::core::value::Row;
use crate::error::{Result, SyncError};

/// Keys per row-fetch query.
pub const ROW_FETCH_BATCH: usize = 500;

/// Stream the rows produced by `fetch` for each chunk of `keys`, paired with
/// their canonical key.
pub fn chunked_rows<'a, F, Fut>(table: &'a Table, keys: &'a [KeyTuple], fetch: F) -> RowStream<'a>
where
    F: FnMut(&'a [KeyTuple]) -> Fut + Send + 'a,
    Fut: Future<Output = Result<Vec<Row>>> + Send + 'a,
{
    stream::iter(keys.chunks(ROW_FETCH_BATCH))
        .then(fetch)
        .map_ok(|rows| stream::iter(rows.into_iter().map(Ok::<Row, SyncError>)))
        .try_flatten()
        .map(move |row| {
            let row = row?;
            Ok((table.primary_key_hash(&row)?, row))
        })
        .boxed()
}
