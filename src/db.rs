use std::sync::Arc;

use crate::config::Options;
use crate::errusage;
use crate::error::{Error, Result};
use crate::key::{self, TableId};
use crate::kv::{KvBatch, KvEngine, KvSnapshot};

/// The data version this core reads and writes. Bump on any incompatible
/// change to the key layout or value encoding.
pub const CORE_VERSION: u32 = 1;

/// The metadata key holding the store version. Table id 0 is reserved so
/// metadata keys can never collide with table keyspaces.
const VERSION_KEY: &[u8] = b"\x00_version";

/// A CinderDB store handle over an ordered key-value engine.
///
/// Cheap to clone; clones share the engine. Tables are registered on top of
/// a handle at startup and carry it along.
pub struct Db<E: KvEngine> {
    inner: Arc<DbInner<E>>,
}

struct DbInner<E> {
    engine: E,
    options: Options,
}

impl<E: KvEngine> Clone for Db<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E: KvEngine> Db<E> {
    /// Open a store on the given engine. An empty engine is initialized
    /// with the current core version; a non-empty one must carry exactly
    /// that version.
    pub fn open(engine: E, options: Options) -> Result<Self> {
        match engine.get(VERSION_KEY)? {
            None => {
                engine.set(VERSION_KEY, bincode::serialize(&CORE_VERSION)?)?;
                tracing::info!(version = CORE_VERSION, "initialized store");
            }
            Some(bytes) => {
                let found: u32 = bincode::deserialize(&bytes)?;
                if found != CORE_VERSION {
                    return Err(Error::VersionMismatch {
                        found,
                        expected: CORE_VERSION,
                    });
                }
            }
        }
        Ok(Self {
            inner: Arc::new(DbInner { engine, options }),
        })
    }

    /// The underlying engine.
    pub fn engine(&self) -> &E {
        &self.inner.engine
    }

    /// The store options.
    pub fn options(&self) -> &Options {
        &self.inner.options
    }

    /// The version stored in the engine.
    pub fn version(&self) -> Result<u32> {
        match self.inner.engine.get(VERSION_KEY)? {
            Some(bytes) => Ok(bincode::deserialize(&bytes)?),
            None => Err(Error::Corruption("store version key missing".to_string())),
        }
    }

    /// Deletes every key of a table: its rows and all of its index entries.
    /// The table's in-process registration, if any, is unaffected.
    pub fn drop_table(&self, table_id: TableId) -> Result<()> {
        if table_id == 0 {
            return errusage!("table id 0 is reserved for store metadata");
        }
        let snapshot = self.inner.engine.snapshot()?;
        let mut batch = self.inner.engine.batch();
        for entry in snapshot.scan_prefix(&key::table_prefix(table_id)) {
            let (entry_key, _) = entry?;
            batch.delete(entry_key);
        }
        let dropped = batch.len();
        batch.commit()?;
        tracing::debug!(table_id, keys = dropped, "dropped table");
        Ok(())
    }

    /// Close the store. The engine shuts down when the last handle drops.
    pub fn close(self) -> Result<()> {
        Ok(())
    }
}
