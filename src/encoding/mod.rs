pub mod bincode;
pub mod format;
pub mod keycode;

use std::ops::Deref;
use std::sync::{Arc, Mutex};

use crate::error::Result;

/// Encodes records of one type to value bytes and back.
///
/// Key encoding must preserve ordering and lives in keycode; values don't
/// need to preserve ordering, so implementations are free to use any
/// self-contained format. The default is bincode.
///
/// Implementations must be deterministic: serializing equal records twice
/// yields equal bytes within one process lifetime.
pub trait Serializer<R>: Send + Sync {
    /// Encode a record to value bytes.
    fn serialize(&self, record: &R) -> Result<Vec<u8>>;

    /// Decode value bytes back into a record.
    fn deserialize(&self, bytes: &[u8]) -> Result<R>;

    /// Encode a record into a pooled buffer. The buffer returns to its pool
    /// when the guard drops, on every exit path.
    fn serialize_pooled(&self, record: &R) -> Result<PooledBuf> {
        Ok(PooledBuf::unpooled(self.serialize(record)?))
    }
}

/// A bounded pool of reusable serialization buffers.
#[derive(Debug)]
pub struct BufferPool {
    buffers: Mutex<Vec<Vec<u8>>>,
    max: usize,
}

impl BufferPool {
    /// Create a pool retaining at most max buffers.
    pub fn new(max: usize) -> Arc<Self> {
        Arc::new(Self {
            buffers: Mutex::new(Vec::new()),
            max,
        })
    }

    /// Take a cleared buffer from the pool, or allocate a fresh one.
    pub fn acquire(self: &Arc<Self>) -> PooledBuf {
        let buf = self
            .buffers
            .lock()
            .map(|mut buffers| buffers.pop())
            .unwrap_or_default()
            .unwrap_or_default();
        PooledBuf {
            buf,
            pool: Some(Arc::clone(self)),
        }
    }

    fn release(&self, mut buf: Vec<u8>) {
        buf.clear();
        if let Ok(mut buffers) = self.buffers.lock() {
            if buffers.len() < self.max {
                buffers.push(buf);
            }
        }
    }
}

/// A serialization buffer borrowed from a pool. Dereferences to the encoded
/// bytes; dropping it returns the allocation to the pool.
#[derive(Debug)]
pub struct PooledBuf {
    buf: Vec<u8>,
    pool: Option<Arc<BufferPool>>,
}

impl PooledBuf {
    /// Wrap a plain buffer that does not belong to a pool.
    pub fn unpooled(buf: Vec<u8>) -> Self {
        Self { buf, pool: None }
    }

    pub(crate) fn buf_mut(&mut self) -> &mut Vec<u8> {
        &mut self.buf
    }
}

impl Deref for PooledBuf {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.buf
    }
}

impl Drop for PooledBuf {
    fn drop(&mut self) {
        if let Some(pool) = self.pool.take() {
            pool.release(std::mem::take(&mut self.buf));
        }
    }
}
