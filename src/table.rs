//! Typed tables over the key-value engine.
//!
//! A table binds a record type to a table id, a primary-key projector, and
//! a serializer. Rows are stored under their composite primary key with the
//! serialized record as value; every registered index gets one entry per
//! accepted row, maintained in the same atomic batch as the row itself.

use std::sync::{Arc, RwLock};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::cancel::CancelToken;
use crate::db::Db;
use crate::encoding::bincode::BincodeSerializer;
use crate::encoding::format::{Composite, Formatter as _};
use crate::encoding::Serializer;
use crate::errusage;
use crate::error::{Error, Result};
use crate::executor;
use crate::index::Index;
use crate::key::{self, KeyBuilder, TableId, PRIMARY_INDEX_ID};
use crate::kv::{KvBatch, KvEngine, KvSnapshot};
use crate::query::Query;

/// Projects a record to its primary key bytes.
pub type PrimaryKeyFn<R> = dyn Fn(KeyBuilder, &R) -> Vec<u8> + Send + Sync;

/// Resolves an upsert conflict: (stored, new) to the row to keep.
pub type ConflictFn<R> = dyn Fn(&R, &R) -> R + Send + Sync;

/// A typed table. Cheap to clone; clones share registration state.
pub struct Table<R, E: KvEngine> {
    inner: Arc<TableInner<R, E>>,
}

struct TableInner<R, E: KvEngine> {
    db: Db<E>,
    id: TableId,
    name: String,
    primary_key_fn: Box<PrimaryKeyFn<R>>,
    serializer: Box<dyn Serializer<R>>,
    /// Frozen after startup by convention; mutating while queries run is
    /// undefined behavior.
    indexes: RwLock<Vec<Arc<Index<R>>>>,
}

impl<R, E: KvEngine> Clone for Table<R, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R, E> Table<R, E>
where
    E: KvEngine,
    R: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// Create a table with the default bincode serializer.
    pub fn new(
        db: &Db<E>,
        id: TableId,
        name: &str,
        primary_key_fn: impl Fn(KeyBuilder, &R) -> Vec<u8> + Send + Sync + 'static,
    ) -> Result<Self> {
        let serializer = BincodeSerializer::new(db.options().buffer_pool_size);
        Self::with_serializer(db, id, name, primary_key_fn, serializer)
    }
}

impl<R, E> Table<R, E>
where
    E: KvEngine,
    R: 'static,
{
    /// Create a table with a custom serializer.
    pub fn with_serializer(
        db: &Db<E>,
        id: TableId,
        name: &str,
        primary_key_fn: impl Fn(KeyBuilder, &R) -> Vec<u8> + Send + Sync + 'static,
        serializer: impl Serializer<R> + 'static,
    ) -> Result<Self> {
        if id == 0 {
            return errusage!("table id 0 is reserved for store metadata");
        }
        Ok(Self {
            inner: Arc::new(TableInner {
                db: db.clone(),
                id,
                name: name.to_string(),
                primary_key_fn: Box::new(primary_key_fn),
                serializer: Box::new(serializer),
                indexes: RwLock::new(Vec::new()),
            }),
        })
    }

    pub fn id(&self) -> TableId {
        self.inner.id
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn db(&self) -> &Db<E> {
        &self.inner.db
    }

    /// Register indexes on this table. Callers keep their Arc handles for
    /// query().with() and scan_index(). With reindex, existing rows are
    /// projected into the new indexes in one atomic batch before the
    /// indexes become visible.
    pub fn add_index(
        &self,
        indexes: Vec<Arc<Index<R>>>,
        reindex: bool,
        token: &CancelToken,
    ) -> Result<()> {
        {
            let registered = self.inner.indexes.read()?;
            for (i, index) in indexes.iter().enumerate() {
                if index.id() == PRIMARY_INDEX_ID {
                    return errusage!("index id 0 is reserved for the primary index");
                }
                let taken = registered.iter().any(|r| r.id() == index.id())
                    || indexes[..i].iter().any(|r| r.id() == index.id());
                if taken {
                    return errusage!(
                        "index id {} already registered on table {}",
                        index.id(),
                        self.inner.name
                    );
                }
            }
        }

        if reindex {
            let snapshot = self.engine().snapshot()?;
            let mut batch = self.engine().batch();
            let prefix = key::index_prefix(self.inner.id, PRIMARY_INDEX_ID, &[]);
            let interval = self.inner.db.options().cancel_check_interval;
            for (step, entry) in snapshot.scan_prefix(&prefix).enumerate() {
                if step % interval == 0 {
                    token.check()?;
                }
                let (_, value) = entry?;
                let row = self.inner.serializer.deserialize(&value)?;
                for index in &indexes {
                    if index.should_index(&row) {
                        batch.set(self.index_entry_key(index, &row), Vec::new());
                    }
                }
            }
            let entries = batch.len();
            batch.commit()?;
            tracing::debug!(
                table = %self.inner.name,
                entries,
                "populated new indexes"
            );
        }

        self.inner.indexes.write()?.extend(indexes);
        Ok(())
    }

    /// Insert rows. Fails with AlreadyExists if any primary key is already
    /// present, including duplicates within the call; on failure nothing is
    /// written.
    pub fn insert(
        &self,
        rows: &[R],
        token: &CancelToken,
        batch: Option<&mut E::Batch>,
    ) -> Result<()> {
        self.with_batch(batch, |table, batch| table.insert_into(rows, token, batch))
    }

    /// Update rows. Fails with NotFound if any primary key is missing.
    /// Index entries are rewritten only where their bytes change.
    pub fn update(
        &self,
        rows: &[R],
        token: &CancelToken,
        batch: Option<&mut E::Batch>,
    ) -> Result<()> {
        self.with_batch(batch, |table, batch| table.update_into(rows, token, batch))
    }

    /// Insert rows that are absent; resolve present ones through
    /// on_conflict, or replace them when no resolver is given.
    pub fn upsert(
        &self,
        rows: &[R],
        on_conflict: Option<&ConflictFn<R>>,
        token: &CancelToken,
        batch: Option<&mut E::Batch>,
    ) -> Result<()>
    where
        R: Clone,
    {
        self.with_batch(batch, |table, batch| {
            table.upsert_into(rows, on_conflict, token, batch)
        })
    }

    /// Delete rows and their index entries. Rows whose primary key is
    /// absent are skipped.
    pub fn delete(
        &self,
        rows: &[R],
        token: &CancelToken,
        batch: Option<&mut E::Batch>,
    ) -> Result<()> {
        self.with_batch(batch, |table, batch| table.delete_into(rows, token, batch))
    }

    /// Point lookups by primary key. The passed rows only need their
    /// primary-key fields populated. Fails with NotFound on the first
    /// missing key.
    pub fn get(
        &self,
        keys: &[R],
        token: &CancelToken,
        batch: Option<&E::Batch>,
    ) -> Result<Vec<R>> {
        let mut rows = Vec::with_capacity(keys.len());
        for selector in keys {
            token.check()?;
            let data_key = self.primary_data_key(selector);
            let value = match &batch {
                Some(batch) => batch.get(&data_key)?,
                None => self.engine().get(&data_key)?,
            };
            match value {
                Some(value) => rows.push(self.inner.serializer.deserialize(&value)?),
                None => return Err(Error::NotFound),
            }
        }
        Ok(rows)
    }

    /// Whether a row with this primary key exists.
    pub fn exists(&self, selector: &R, batch: Option<&E::Batch>) -> Result<bool> {
        let data_key = self.primary_data_key(selector);
        let value = match &batch {
            Some(batch) => batch.get(&data_key)?,
            None => self.engine().get(&data_key)?,
        };
        Ok(value.is_some())
    }

    /// Visit every row in primary-key order. The visitor returns false to
    /// stop early.
    pub fn scan(
        &self,
        token: &CancelToken,
        mut visitor: impl FnMut(R) -> Result<bool>,
    ) -> Result<()> {
        executor::execute(&self.query(), token, &mut visitor)
    }

    /// Visit rows of one index group in index order. The selector only
    /// needs the fields the index key projects.
    pub fn scan_index(
        &self,
        index: &Index<R>,
        selector: R,
        token: &CancelToken,
        mut visitor: impl FnMut(R) -> Result<bool>,
    ) -> Result<()> {
        executor::execute(&self.query().with(index, selector), token, &mut visitor)
    }

    /// Start building a query against this table.
    pub fn query(&self) -> Query<R, E> {
        Query::new(self.clone())
    }

    /// Run a closure against the caller's batch, or an owned batch that is
    /// committed on success and discarded on error.
    fn with_batch(
        &self,
        batch: Option<&mut E::Batch>,
        op: impl FnOnce(&Self, &mut E::Batch) -> Result<()>,
    ) -> Result<()> {
        match batch {
            Some(batch) => op(self, batch),
            None => {
                let mut own = self.engine().batch();
                op(self, &mut own)?;
                own.commit()
            }
        }
    }

    fn insert_into(&self, rows: &[R], token: &CancelToken, batch: &mut E::Batch) -> Result<()> {
        let indexes = self.indexes()?;
        for (primary_key, row) in self.rows_by_primary_key(rows, true)? {
            token.check()?;
            let data_key = self.data_key(&primary_key);
            if batch.get(&data_key)?.is_some() {
                return Err(Error::AlreadyExists(format!(
                    "table {}: {}",
                    self.inner.name,
                    Composite::key(&data_key)
                )));
            }
            let value = self.inner.serializer.serialize_pooled(row)?;
            batch.set(data_key, value.to_vec());
            for index in &indexes {
                if index.should_index(row) {
                    batch.set(self.index_entry_key(index, row), Vec::new());
                }
            }
        }
        Ok(())
    }

    fn update_into(&self, rows: &[R], token: &CancelToken, batch: &mut E::Batch) -> Result<()> {
        let indexes = self.indexes()?;
        for (primary_key, row) in self.rows_by_primary_key(rows, false)? {
            token.check()?;
            let data_key = self.data_key(&primary_key);
            let Some(old_value) = batch.get(&data_key)? else {
                return Err(Error::NotFound);
            };
            let old = self.inner.serializer.deserialize(&old_value)?;
            let value = self.inner.serializer.serialize_pooled(row)?;
            batch.set(data_key, value.to_vec());
            self.move_index_entries(&indexes, &old, row, batch);
        }
        Ok(())
    }

    fn upsert_into(
        &self,
        rows: &[R],
        on_conflict: Option<&ConflictFn<R>>,
        token: &CancelToken,
        batch: &mut E::Batch,
    ) -> Result<()>
    where
        R: Clone,
    {
        let indexes = self.indexes()?;
        for (primary_key, row) in self.rows_by_primary_key(rows, false)? {
            token.check()?;
            let data_key = self.data_key(&primary_key);
            match batch.get(&data_key)? {
                Some(old_value) => {
                    let old = self.inner.serializer.deserialize(&old_value)?;
                    let resolved = match on_conflict {
                        Some(resolve) => resolve(&old, row),
                        None => row.clone(),
                    };
                    let value = self.inner.serializer.serialize_pooled(&resolved)?;
                    batch.set(data_key, value.to_vec());
                    self.move_index_entries(&indexes, &old, &resolved, batch);
                }
                None => {
                    let value = self.inner.serializer.serialize_pooled(row)?;
                    batch.set(data_key, value.to_vec());
                    for index in &indexes {
                        if index.should_index(row) {
                            batch.set(self.index_entry_key(index, row), Vec::new());
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn delete_into(&self, rows: &[R], token: &CancelToken, batch: &mut E::Batch) -> Result<()> {
        let indexes = self.indexes()?;
        for (primary_key, _) in self.rows_by_primary_key(rows, false)? {
            token.check()?;
            let data_key = self.data_key(&primary_key);
            // Tombstones are computed from the stored row, not the caller's
            // copy, so stale callers can't orphan index entries.
            let Some(old_value) = batch.get(&data_key)? else {
                continue;
            };
            let old = self.inner.serializer.deserialize(&old_value)?;
            batch.delete(data_key);
            for index in &indexes {
                if index.should_index(&old) {
                    batch.delete(self.index_entry_key(index, &old));
                }
            }
        }
        Ok(())
    }

    /// Delete-old / put-new index entries for a row transition, touching
    /// only indexes whose entry bytes actually change.
    fn move_index_entries(
        &self,
        indexes: &[Arc<Index<R>>],
        old: &R,
        new: &R,
        batch: &mut E::Batch,
    ) {
        for index in indexes {
            match (index.should_index(old), index.should_index(new)) {
                (true, true) => {
                    let old_key = self.index_entry_key(index, old);
                    let new_key = self.index_entry_key(index, new);
                    if old_key != new_key {
                        batch.delete(old_key);
                        batch.set(new_key, Vec::new());
                    }
                }
                (true, false) => batch.delete(self.index_entry_key(index, old)),
                (false, true) => batch.set(self.index_entry_key(index, new), Vec::new()),
                (false, false) => {}
            }
        }
    }

    /// Pair rows with their primary-key bytes, ordered by key so duplicate
    /// detection and write order are deterministic.
    fn rows_by_primary_key<'r>(
        &self,
        rows: &'r [R],
        reject_duplicates: bool,
    ) -> Result<Vec<(Vec<u8>, &'r R)>> {
        let mut ordered: Vec<(Vec<u8>, &R)> = rows
            .iter()
            .map(|row| (self.primary_key(row), row))
            .collect();
        ordered.sort_by(|a, b| a.0.cmp(&b.0));
        if reject_duplicates {
            for pair in ordered.windows(2) {
                if pair[0].0 == pair[1].0 {
                    return Err(Error::AlreadyExists(format!(
                        "table {}: duplicate primary key in call: {}",
                        self.inner.name,
                        Composite::key(&self.data_key(&pair[0].0))
                    )));
                }
            }
        }
        Ok(ordered)
    }

    pub(crate) fn engine(&self) -> &E {
        self.inner.db.engine()
    }

    pub(crate) fn serializer(&self) -> &dyn Serializer<R> {
        self.inner.serializer.as_ref()
    }

    /// The primary-key bytes of a record.
    pub(crate) fn primary_key(&self, record: &R) -> Vec<u8> {
        (self.inner.primary_key_fn)(KeyBuilder::new(), record)
    }

    /// The full composite key of a record's primary row.
    pub(crate) fn primary_data_key(&self, record: &R) -> Vec<u8> {
        self.data_key(&self.primary_key(record))
    }

    /// The composite primary-row key for raw primary-key bytes.
    pub(crate) fn data_key(&self, primary_key: &[u8]) -> Vec<u8> {
        key::encode(self.inner.id, PRIMARY_INDEX_ID, &[], &[], primary_key)
    }

    /// The composite key of a record's entry in the given index.
    pub(crate) fn index_entry_key(&self, index: &Index<R>, record: &R) -> Vec<u8> {
        key::encode(
            self.inner.id,
            index.id(),
            &index.key_of(record),
            &index.order_of(record),
            &self.primary_key(record),
        )
    }

    /// A point-in-time copy of the registered indexes.
    pub(crate) fn indexes(&self) -> Result<Vec<Arc<Index<R>>>> {
        Ok(self.inner.indexes.read()?.clone())
    }

    /// Look up a registered index by id.
    pub(crate) fn registered(&self, id: crate::key::IndexId) -> Result<Option<Arc<Index<R>>>> {
        Ok(self
            .inner
            .indexes
            .read()?
            .iter()
            .find(|index| index.id() == id)
            .cloned())
    }
}
