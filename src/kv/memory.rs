//! An in-memory engine backing the store contract.
//!
//! An ordered map behind a read-write lock. Batches stage their writes in
//! their own ordered map (later writes to a key shadow earlier ones) and
//! apply them in a single write-lock critical section, which gives batch
//! atomicity. Snapshots clone the map under the read lock into an Arc, so
//! reads through a snapshot are immune to later writes. Cloning is O(n) but
//! this engine targets tests and small working sets; disk engines implement
//! snapshots natively.

use std::collections::{btree_map, BTreeMap};
use std::sync::{Arc, RwLock};

use super::{KeyRange, KvBatch, KvEngine, KvSnapshot};
use crate::error::Result;

type Map = BTreeMap<Vec<u8>, Vec<u8>>;

/// An in-memory ordered key-value engine.
#[derive(Debug, Default, Clone)]
pub struct Memory {
    data: Arc<RwLock<Map>>,
}

impl Memory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live keys.
    pub fn len(&self) -> Result<usize> {
        Ok(self.data.read()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.data.read()?.is_empty())
    }
}

impl KvEngine for Memory {
    type Batch = MemoryBatch;
    type Snapshot = MemorySnapshot;

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.data.read()?.get(key).cloned())
    }

    fn set(&self, key: &[u8], value: Vec<u8>) -> Result<()> {
        self.data.write()?.insert(key.to_vec(), value);
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        self.data.write()?.remove(key);
        Ok(())
    }

    fn batch(&self) -> MemoryBatch {
        MemoryBatch {
            data: Arc::clone(&self.data),
            staged: BTreeMap::new(),
        }
    }

    fn snapshot(&self) -> Result<MemorySnapshot> {
        let data = Arc::new(self.data.read()?.clone());
        Ok(MemorySnapshot { data })
    }
}

/// A write batch staging sets and deletes until commit.
pub struct MemoryBatch {
    data: Arc<RwLock<Map>>,
    staged: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
}

impl KvBatch for MemoryBatch {
    fn set(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.staged.insert(key, Some(value));
    }

    fn delete(&mut self, key: Vec<u8>) {
        self.staged.insert(key, None);
    }

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        if let Some(staged) = self.staged.get(key) {
            return Ok(staged.clone());
        }
        Ok(self.data.read()?.get(key).cloned())
    }

    fn commit(self) -> Result<()> {
        let mut data = self.data.write()?;
        for (key, op) in self.staged {
            match op {
                Some(value) => data.insert(key, value),
                None => data.remove(&key),
            };
        }
        Ok(())
    }

    fn len(&self) -> usize {
        self.staged.len()
    }
}

/// An immutable view of the engine at snapshot time.
pub struct MemorySnapshot {
    data: Arc<Map>,
}

impl KvSnapshot for MemorySnapshot {
    type ScanIterator<'a> = ScanIter<'a>;

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.data.get(key).cloned())
    }

    fn scan(&self, range: KeyRange) -> ScanIter<'_> {
        ScanIter {
            inner: self.data.range(range),
        }
    }
}

pub struct ScanIter<'a> {
    inner: btree_map::Range<'a, Vec<u8>, Vec<u8>>,
}

impl Iterator for ScanIter<'_> {
    type Item = Result<(Vec<u8>, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner
            .next()
            .map(|(key, value)| Ok((key.clone(), value.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::prefix_range;
    use std::ops::Bound;

    fn engine_with(pairs: &[(&[u8], &[u8])]) -> Memory {
        let engine = Memory::new();
        for (key, value) in pairs {
            engine.set(key, value.to_vec()).unwrap();
        }
        engine
    }

    #[test]
    fn test_set_get_delete() {
        let engine = Memory::new();
        engine.set(b"key1", b"value1".to_vec()).unwrap();
        assert_eq!(engine.get(b"key1").unwrap(), Some(b"value1".to_vec()));

        engine.set(b"key1", b"value2".to_vec()).unwrap();
        assert_eq!(engine.get(b"key1").unwrap(), Some(b"value2".to_vec()));

        engine.delete(b"key1").unwrap();
        assert_eq!(engine.get(b"key1").unwrap(), None);

        // Deleting a missing key is a no-op.
        engine.delete(b"key1").unwrap();
    }

    #[test]
    fn test_scan_is_ordered() {
        let engine = engine_with(&[(b"b".as_slice(), b"2".as_slice()), (b"a".as_slice(), b"1".as_slice()), (b"c".as_slice(), b"3".as_slice())]);
        let keys: Vec<_> = engine
            .snapshot()
            .unwrap()
            .scan((Bound::Unbounded, Bound::Unbounded))
            .map(|r| r.unwrap().0)
            .collect();
        assert_eq!(keys, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
    }

    #[test]
    fn test_scan_prefix() {
        let engine = engine_with(&[(b"a/1".as_slice(), b"1".as_slice()), (b"a/2".as_slice(), b"2".as_slice()), (b"b/1".as_slice(), b"3".as_slice())]);
        let snapshot = engine.snapshot().unwrap();
        let keys: Vec<_> = snapshot
            .scan(prefix_range(b"a/"))
            .map(|r| r.unwrap().0)
            .collect();
        assert_eq!(keys, vec![b"a/1".to_vec(), b"a/2".to_vec()]);
    }

    #[test]
    fn test_batch_atomic_commit_and_shadowing() {
        let engine = engine_with(&[(b"a".as_slice(), b"old".as_slice()), (b"gone".as_slice(), b"x".as_slice())]);

        let mut batch = engine.batch();
        batch.set(b"a".to_vec(), b"new".to_vec());
        batch.set(b"b".to_vec(), b"fresh".to_vec());
        batch.delete(b"gone".to_vec());

        // Read-your-writes inside the batch, invisible outside it.
        assert_eq!(batch.get(b"a").unwrap(), Some(b"new".to_vec()));
        assert_eq!(batch.get(b"gone").unwrap(), None);
        assert_eq!(engine.get(b"a").unwrap(), Some(b"old".to_vec()));

        batch.commit().unwrap();
        assert_eq!(engine.get(b"a").unwrap(), Some(b"new".to_vec()));
        assert_eq!(engine.get(b"b").unwrap(), Some(b"fresh".to_vec()));
        assert_eq!(engine.get(b"gone").unwrap(), None);
    }

    #[test]
    fn test_batch_last_write_wins() {
        let engine = Memory::new();
        let mut batch = engine.batch();
        batch.set(b"k".to_vec(), b"1".to_vec());
        batch.delete(b"k".to_vec());
        batch.set(b"k".to_vec(), b"2".to_vec());
        assert_eq!(batch.len(), 1);
        batch.commit().unwrap();
        assert_eq!(engine.get(b"k").unwrap(), Some(b"2".to_vec()));
    }

    #[test]
    fn test_dropped_batch_discards_writes() {
        let engine = Memory::new();
        let mut batch = engine.batch();
        batch.set(b"k".to_vec(), b"1".to_vec());
        drop(batch);
        assert_eq!(engine.get(b"k").unwrap(), None);
    }

    #[test]
    fn test_snapshot_isolation() {
        let engine = engine_with(&[(b"k".as_slice(), b"before".as_slice())]);
        let snapshot = engine.snapshot().unwrap();

        engine.set(b"k", b"after".to_vec()).unwrap();
        engine.set(b"new", b"x".to_vec()).unwrap();

        assert_eq!(snapshot.get(b"k").unwrap(), Some(b"before".to_vec()));
        assert_eq!(snapshot.get(b"new").unwrap(), None);

        let count = snapshot.scan((Bound::Unbounded, Bound::Unbounded)).count();
        assert_eq!(count, 1);
    }
}
