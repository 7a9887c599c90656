use std::marker::PhantomData;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::{BufferPool, PooledBuf, Serializer};
use crate::error::Result;

/// The default serializer: bincode value encoding with a bounded buffer
/// pool for the hot write path.
pub struct BincodeSerializer<R> {
    pool: Arc<BufferPool>,
    _record: PhantomData<fn() -> R>,
}

impl<R> BincodeSerializer<R> {
    /// Create a serializer retaining at most pool_size buffers.
    pub fn new(pool_size: usize) -> Self {
        Self {
            pool: BufferPool::new(pool_size),
            _record: PhantomData,
        }
    }
}

impl<R> Default for BincodeSerializer<R> {
    fn default() -> Self {
        Self::new(crate::config::Options::default().buffer_pool_size)
    }
}

impl<R> Serializer<R> for BincodeSerializer<R>
where
    R: Serialize + DeserializeOwned + Send + Sync,
{
    fn serialize(&self, record: &R) -> Result<Vec<u8>> {
        Ok(bincode::serialize(record)?)
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<R> {
        Ok(bincode::deserialize(bytes)?)
    }

    fn serialize_pooled(&self, record: &R) -> Result<PooledBuf> {
        let mut buf = self.pool.acquire();
        bincode::serialize_into(buf.buf_mut(), record)?;
        Ok(buf)
    }
}
