//! Composable queries over a table.
//!
//! A query scans the primary index unless with() restricts it to a
//! secondary index group, then applies filter, order, offset, limit, and
//! cursor options. The builder never fails mid-chain: conflicting options
//! are recorded and surfaced when the query executes.

use std::cmp::Ordering;
use std::sync::Arc;

use crate::cancel::CancelToken;
use crate::error::{Error, Result};
use crate::executor;
use crate::index::Index;
use crate::kv::KvEngine;
use crate::table::Table;

/// A post-decode row predicate.
pub type FilterFn<R> = dyn Fn(&R) -> bool + Send + Sync;

/// An in-memory row comparator.
pub type OrderFn<R> = dyn Fn(&R, &R) -> Ordering + Send + Sync;

/// A query under construction. Options compose in any order; execute runs
/// the scan.
pub struct Query<R, E: KvEngine> {
    pub(crate) table: Table<R, E>,
    /// The active secondary index and the selector deriving its scan
    /// prefix. None scans the whole table in primary-key order.
    pub(crate) with: Option<(Arc<Index<R>>, R)>,
    pub(crate) filter: Option<Box<FilterFn<R>>>,
    pub(crate) order: Option<Box<OrderFn<R>>>,
    pub(crate) offset: u64,
    /// 0 means unbounded.
    pub(crate) limit: u64,
    pub(crate) after: Option<R>,
    /// The first builder misuse, reported by execute.
    pub(crate) error: Option<Error>,
}

impl<R, E> Query<R, E>
where
    E: KvEngine,
    R: 'static,
{
    pub(crate) fn new(table: Table<R, E>) -> Self {
        Self {
            table,
            with: None,
            filter: None,
            order: None,
            offset: 0,
            limit: 0,
            after: None,
            error: None,
        }
    }

    /// Restrict the scan to the index group selected by the given record.
    /// The selector only needs the fields the index key projects. The index
    /// must already be registered on the table.
    pub fn with(mut self, index: &Index<R>, selector: R) -> Self {
        if self.with.is_some() {
            self.record_error(Error::Usage(
                "with() may only be called once per query".to_string(),
            ));
            return self;
        }
        match self.table.registered(index.id()) {
            Ok(Some(registered)) => self.with = Some((registered, selector)),
            Ok(None) => self.record_error(Error::Usage(format!(
                "index {} is not registered on table {}",
                index.name(),
                self.table.name()
            ))),
            Err(err) => self.record_error(err),
        }
        self
    }

    /// Keep only rows passing the predicate. Skipped rows do not count
    /// toward offset or limit.
    pub fn filter(mut self, filter: impl Fn(&R) -> bool + Send + Sync + 'static) -> Self {
        self.filter = Some(Box::new(filter));
        self
    }

    /// Sort matched rows in memory before offset and limit apply. Requires
    /// materializing every matched row; incompatible with after().
    pub fn order(mut self, order: impl Fn(&R, &R) -> Ordering + Send + Sync + 'static) -> Self {
        if self.after.is_some() {
            self.record_error(Error::Usage(
                "order() cannot be combined with after(): the cursor is only defined in index order"
                    .to_string(),
            ));
            return self;
        }
        self.order = Some(Box::new(order));
        self
    }

    /// Skip the first n matched rows.
    pub fn offset(mut self, n: u64) -> Self {
        self.offset = n;
        self
    }

    /// Stop after emitting n rows. Zero means unbounded.
    pub fn limit(mut self, n: u64) -> Self {
        self.limit = n;
        self
    }

    /// Resume strictly after the given row under the active index's order.
    /// Incompatible with order().
    pub fn after(mut self, row: R) -> Self {
        if self.order.is_some() {
            self.record_error(Error::Usage(
                "after() cannot be combined with order(): the cursor is only defined in index order"
                    .to_string(),
            ));
            return self;
        }
        self.after = Some(row);
        self
    }

    /// Run the query, collecting matched rows in result order.
    pub fn execute(&self, token: &CancelToken) -> Result<Vec<R>> {
        let mut rows = Vec::new();
        executor::execute(self, token, &mut |row| {
            rows.push(row);
            Ok(true)
        })?;
        Ok(rows)
    }

    fn record_error(&mut self, error: Error) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }
}
