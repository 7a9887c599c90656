//! Query execution.
//!
//! The executor resolves the active index, derives scan bounds from the
//! selector and cursor, and streams decoded rows through the option
//! pipeline. Everything runs against one engine snapshot, so index entries
//! and the primary rows they reference are read from the same point in
//! time. Memory stays O(limit) unless order() forces materialization.

use std::ops::Bound;
use std::sync::Arc;

use crate::cancel::CancelToken;
use crate::encoding::format::{Composite, Formatter as _};
use crate::errcorrupt;
use crate::error::Result;
use crate::index::Index;
use crate::key::{self, PRIMARY_INDEX_ID};
use crate::kv::{prefix_range, KvEngine, KvSnapshot};
use crate::query::Query;

/// Run a query, feeding matched rows to emit in result order. The emitter
/// returns false to stop early. Rows stream unless the query orders them.
pub(crate) fn execute<R, E>(
    query: &Query<R, E>,
    token: &CancelToken,
    emit: &mut dyn FnMut(R) -> Result<bool>,
) -> Result<()>
where
    E: KvEngine,
    R: 'static,
{
    token.check()?;
    if let Some(error) = &query.error {
        return Err(error.clone());
    }

    let table = &query.table;
    let interval = table.db().options().cancel_check_interval;
    let snapshot = table.engine().snapshot()?;

    // The active index determines the scan prefix and how a row is
    // recovered from an entry. Order projectors only emit fixed-width
    // fields, so running one against the selector yields the index's
    // order-byte width.
    let source = match &query.with {
        Some((index, selector)) => Source::Index {
            index: Arc::clone(index),
            index_key: index.key_of(selector),
            order_width: index.order_of(selector).len(),
        },
        None => Source::Primary,
    };
    let prefix = match &source {
        Source::Primary => key::index_prefix(table.id(), PRIMARY_INDEX_ID, &[]),
        Source::Index {
            index, index_key, ..
        } => key::index_prefix(table.id(), index.id(), index_key),
    };
    let (mut lower, upper) = prefix_range(&prefix);

    // The cursor overrides the lower bound: strictly past the after-row's
    // full composite key under the active index.
    if let Some(after) = &query.after {
        let full_key = match &source {
            Source::Primary => table.primary_data_key(after),
            Source::Index { index, .. } => table.index_entry_key(index, after),
        };
        lower = Bound::Excluded(full_key);
    }

    // An after-row past the end of the scanned group empties the range;
    // engines may reject inverted bounds, so end the scan here.
    if let (Bound::Included(lo) | Bound::Excluded(lo), Bound::Excluded(hi)) = (&lower, &upper) {
        if lo >= hi {
            return Ok(());
        }
    }

    let mut remaining_offset = query.offset;
    let limit = match query.limit {
        0 => u64::MAX,
        n => n,
    };
    let mut emitted = 0u64;
    let mut materialized: Vec<R> = Vec::new();

    for (step, entry) in snapshot.scan((lower, upper)).enumerate() {
        if step % interval == 0 {
            token.check()?;
        }
        let (entry_key, entry_value) = entry?;

        let row: R = match &source {
            Source::Primary => table.serializer().deserialize(&entry_value)?,
            Source::Index { order_width, .. } => {
                let decoded = key::decode(&entry_key)?;
                if decoded.tail.len() < *order_width {
                    return errcorrupt!(
                        "index entry shorter than its order bytes: {}",
                        Composite::key(&entry_key)
                    );
                }
                let primary_key = &decoded.tail[*order_width..];
                let data_key = table.data_key(primary_key);
                token.check()?;
                // A miss here is a dangling index entry, not an empty
                // result: the snapshot guarantees the row was visible when
                // the entry was.
                let Some(value) = snapshot.get(&data_key)? else {
                    return errcorrupt!(
                        "index entry references missing row: {}",
                        Composite::key(&entry_key)
                    );
                };
                table.serializer().deserialize(&value)?
            }
        };

        if let Some(filter) = &query.filter {
            if !filter(&row) {
                continue;
            }
        }
        if query.order.is_some() {
            materialized.push(row);
            continue;
        }
        if remaining_offset > 0 {
            remaining_offset -= 1;
            continue;
        }
        token.check()?;
        if !emit(row)? {
            return Ok(());
        }
        emitted += 1;
        if emitted >= limit {
            return Ok(());
        }
    }

    if let Some(order) = &query.order {
        materialized.sort_by(|a, b| order(a, b));
        let take = usize::try_from(limit).unwrap_or(usize::MAX);
        let skip = usize::try_from(query.offset).unwrap_or(usize::MAX);
        for row in materialized.into_iter().skip(skip).take(take) {
            token.check()?;
            if !emit(row)? {
                return Ok(());
            }
        }
    }
    Ok(())
}

enum Source<R> {
    Primary,
    Index {
        index: Arc<Index<R>>,
        index_key: Vec<u8>,
        order_width: usize,
    },
}
