//! The ordered key-value engine contract the store runs on.
//!
//! The store needs little from its substrate: point reads and writes,
//! atomic write batches with read-your-writes, and snapshot-consistent
//! ordered iteration. Anything providing these traits can back a store;
//! the in-memory engine in this module is the reference implementation.

pub mod memory;

use std::ops::Bound;

use crate::error::Result;

pub use memory::Memory;

/// A byte range with explicit bounds, as used by engine scans.
pub type KeyRange = (Bound<Vec<u8>>, Bound<Vec<u8>>);

/// An ordered key-value engine.
pub trait KvEngine: Send + Sync + 'static {
    /// The write batch type.
    type Batch: KvBatch;

    /// The snapshot type for consistent reads.
    type Snapshot: KvSnapshot;

    /// Retrieves the value for a given key.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Inserts or updates a key-value pair.
    fn set(&self, key: &[u8], value: Vec<u8>) -> Result<()>;

    /// Deletes a key. Deleting a missing key is a no-op.
    fn delete(&self, key: &[u8]) -> Result<()>;

    /// Starts an empty write batch.
    fn batch(&self) -> Self::Batch;

    /// Takes a snapshot for consistent reads. Writes committed after the
    /// snapshot was taken are not visible through it.
    fn snapshot(&self) -> Result<Self::Snapshot>;

    /// Comparator split hook: the length of the prefix used for block and
    /// filter pruning. Defaults to the composite-key split.
    fn split(key: &[u8]) -> usize {
        crate::key::split(key)
    }
}

/// A staged set of writes applied atomically on commit.
pub trait KvBatch {
    /// Stages an insert or update.
    fn set(&mut self, key: Vec<u8>, value: Vec<u8>);

    /// Stages a deletion.
    fn delete(&mut self, key: Vec<u8>);

    /// Reads through the batch: staged writes shadow the engine.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Atomically applies every staged write. Consumes the batch; dropping
    /// an uncommitted batch discards it.
    fn commit(self) -> Result<()>;

    /// Number of staged writes.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A consistent view of the engine at one point in time.
pub trait KvSnapshot {
    /// The iterator returned by scan().
    type ScanIterator<'a>: ScanIterator + 'a
    where
        Self: 'a;

    /// Retrieves the value for a given key.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Iterates over an ordered range of key-value pairs.
    fn scan(&self, range: KeyRange) -> Self::ScanIterator<'_>;

    /// Iterates over all key-value pairs starting with the given prefix.
    fn scan_prefix(&self, prefix: &[u8]) -> Self::ScanIterator<'_> {
        self.scan(prefix_range(prefix))
    }
}

pub trait ScanIterator: Iterator<Item = Result<(Vec<u8>, Vec<u8>)>> {}

impl<I> ScanIterator for I where I: Iterator<Item = Result<(Vec<u8>, Vec<u8>)>> {}

/// The range covering exactly the keys starting with the given prefix: the
/// upper bound increments the last non-0xff byte, or is unbounded when no
/// such byte exists.
pub fn prefix_range(prefix: &[u8]) -> KeyRange {
    let start = Bound::Included(prefix.to_vec());
    let end = match prefix.iter().rposition(|b| *b != 0xff) {
        Some(i) => Bound::Excluded(
            prefix[..i]
                .iter()
                .chain(std::iter::once(&(prefix[i] + 1)))
                .copied()
                .collect::<Vec<u8>>(),
        ),
        None => Bound::Unbounded,
    };
    (start, end)
}
