//! Composite key layout and typed key building.
//!
//! Every stored key has the shape:
//!
//! ```text
//! table_id(1) | index_id(1) | index_key_len(4, BE) | index_key | index_order | primary_key
//! ```
//!
//! index_id 0 is the primary index: its index_key and index_order are empty
//! and the tail is the full primary-key encoding, with the serialized record
//! as the entry's value. Secondary entries store an empty value; the
//! referenced primary key is the tail of the composite key itself.
//!
//! The explicit index_key length exists for the engine's comparator split
//! hook: prefix pruning groups entries sharing (table_id, index_id,
//! index_key), and the hook must find the end of that prefix without
//! understanding field encodings.

use crate::encoding::keycode;
use crate::errkey;
use crate::error::Result;

/// Identifies a table within one store. Id 0 is reserved for store metadata.
pub type TableId = u8;

/// Identifies an index within one table.
pub type IndexId = u8;

/// The implicit primary index.
pub const PRIMARY_INDEX_ID: IndexId = 0;

/// Bytes ahead of the index key: table_id, index_id, index_key_len.
pub const HEADER_LEN: usize = 6;

/// Appends typed fields onto a growable buffer in declaration order.
///
/// Equal field tuples produce byte-identical keys, and tuples that compare
/// less at their first differing field produce keys that compare less under
/// memcmp. Methods chain and never fail.
#[derive(Debug, Default)]
pub struct KeyBuilder {
    buf: Vec<u8>,
}

impl KeyBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_bool(mut self, b: bool) -> Self {
        keycode::encode_bool(&mut self.buf, b);
        self
    }

    pub fn add_u8(mut self, i: u8) -> Self {
        keycode::encode_u8(&mut self.buf, i);
        self
    }

    pub fn add_u16(mut self, i: u16) -> Self {
        keycode::encode_u16(&mut self.buf, i);
        self
    }

    pub fn add_u32(mut self, i: u32) -> Self {
        keycode::encode_u32(&mut self.buf, i);
        self
    }

    pub fn add_u64(mut self, i: u64) -> Self {
        keycode::encode_u64(&mut self.buf, i);
        self
    }

    pub fn add_i8(mut self, i: i8) -> Self {
        keycode::encode_i8(&mut self.buf, i);
        self
    }

    pub fn add_i16(mut self, i: i16) -> Self {
        keycode::encode_i16(&mut self.buf, i);
        self
    }

    pub fn add_i32(mut self, i: i32) -> Self {
        keycode::encode_i32(&mut self.buf, i);
        self
    }

    pub fn add_i64(mut self, i: i64) -> Self {
        keycode::encode_i64(&mut self.buf, i);
        self
    }

    /// Append an escaped, terminated byte string field.
    pub fn add_bytes(mut self, bytes: &[u8]) -> Self {
        keycode::encode_bytes(&mut self.buf, bytes);
        self
    }

    pub fn add_string(mut self, s: &str) -> Self {
        keycode::encode_string(&mut self.buf, s);
        self
    }

    /// Append bytes verbatim, without escaping. Only safe for the final
    /// field of a key or for bytes already in keycode form.
    pub fn add_raw(mut self, bytes: &[u8]) -> Self {
        self.buf.extend_from_slice(bytes);
        self
    }

    /// Consume the builder, returning the key bytes.
    pub fn bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

/// Decodes typed fields from the front of a key produced by KeyBuilder.
#[derive(Debug)]
pub struct KeyParser<'a> {
    input: &'a [u8],
}

impl<'a> KeyParser<'a> {
    pub fn new(input: &'a [u8]) -> Self {
        Self { input }
    }

    pub fn bool(&mut self) -> Result<bool> {
        keycode::decode_bool(&mut self.input)
    }

    pub fn u8(&mut self) -> Result<u8> {
        keycode::decode_u8(&mut self.input)
    }

    pub fn u16(&mut self) -> Result<u16> {
        keycode::decode_u16(&mut self.input)
    }

    pub fn u32(&mut self) -> Result<u32> {
        keycode::decode_u32(&mut self.input)
    }

    pub fn u64(&mut self) -> Result<u64> {
        keycode::decode_u64(&mut self.input)
    }

    pub fn i8(&mut self) -> Result<i8> {
        keycode::decode_i8(&mut self.input)
    }

    pub fn i16(&mut self) -> Result<i16> {
        keycode::decode_i16(&mut self.input)
    }

    pub fn i32(&mut self) -> Result<i32> {
        keycode::decode_i32(&mut self.input)
    }

    pub fn i64(&mut self) -> Result<i64> {
        keycode::decode_i64(&mut self.input)
    }

    pub fn bytes(&mut self) -> Result<Vec<u8>> {
        keycode::decode_bytes(&mut self.input)
    }

    pub fn string(&mut self) -> Result<String> {
        keycode::decode_string(&mut self.input)
    }

    /// The undecoded remainder of the input.
    pub fn remainder(&self) -> &'a [u8] {
        self.input
    }

    /// Errors unless the input has been fully consumed.
    pub fn done(&self) -> Result<()> {
        if !self.input.is_empty() {
            return errkey!("{} trailing bytes after key", self.input.len());
        }
        Ok(())
    }
}

/// Assemble a full composite key.
pub fn encode(
    table_id: TableId,
    index_id: IndexId,
    index_key: &[u8],
    index_order: &[u8],
    primary_key: &[u8],
) -> Vec<u8> {
    let mut buf =
        Vec::with_capacity(HEADER_LEN + index_key.len() + index_order.len() + primary_key.len());
    buf.push(table_id);
    buf.push(index_id);
    buf.extend_from_slice(&(index_key.len() as u32).to_be_bytes());
    buf.extend_from_slice(index_key);
    buf.extend_from_slice(index_order);
    buf.extend_from_slice(primary_key);
    buf
}

/// A composite key split at its structural boundaries. The tail holds
/// index_order followed by primary_key; the boundary between those two is
/// determined by the index's (fixed) order-byte width.
#[derive(Debug, PartialEq)]
pub struct DecodedKey<'a> {
    pub table_id: TableId,
    pub index_id: IndexId,
    pub index_key: &'a [u8],
    pub tail: &'a [u8],
}

/// Split a composite key into its structural parts.
pub fn decode(key: &[u8]) -> Result<DecodedKey<'_>> {
    if key.len() < HEADER_LEN {
        return errkey!("composite key shorter than header: {} bytes", key.len());
    }
    let index_key_len = u32::from_be_bytes(key[2..HEADER_LEN].try_into().unwrap()) as usize;
    let Some(tail) = key.get(HEADER_LEN + index_key_len..) else {
        return errkey!("composite key truncated inside index key");
    };
    Ok(DecodedKey {
        table_id: key[0],
        index_id: key[1],
        index_key: &key[HEADER_LEN..HEADER_LEN + index_key_len],
        tail,
    })
}

/// Comparator split hook for the engine: the length of the
/// (table_id, index_id, index_key) prefix, i.e. the position immediately
/// after the index key. Keys not in composite form split at their full
/// length, which disables prefix pruning for them.
pub fn split(key: &[u8]) -> usize {
    if key.len() < HEADER_LEN {
        return key.len();
    }
    let index_key_len = u32::from_be_bytes(key[2..HEADER_LEN].try_into().unwrap()) as usize;
    (HEADER_LEN + index_key_len).min(key.len())
}

/// The scan prefix covering one table: every index of it, and its rows.
pub fn table_prefix(table_id: TableId) -> Vec<u8> {
    vec![table_id]
}

/// The scan prefix covering entries of one index that share an index key.
/// With an empty index_key this covers the whole index.
pub fn index_prefix(table_id: TableId, index_id: IndexId, index_key: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(HEADER_LEN + index_key.len());
    buf.push(table_id);
    buf.push(index_id);
    buf.extend_from_slice(&(index_key.len() as u32).to_be_bytes());
    buf.extend_from_slice(index_key);
    buf
}
