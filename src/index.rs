//! Secondary index descriptors.
//!
//! An index projects a record to a key suffix (which fields the index
//! groups by), an order suffix (how entries sort within one group), and an
//! optional membership predicate (partial indexes). The primary key is
//! always the final composite segment, so rows with identical order bytes
//! iterate in ascending primary-key order.

use crate::encoding::keycode;
use crate::key::{IndexId, KeyBuilder};

/// Sort direction for one order field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

/// Accumulates order bytes for an index entry, one field at a time.
///
/// Ascending fields keep their keycode encoding; descending fields store
/// the bitwise complement, so larger values sort first. Only fixed-width
/// primitives are offered: the executor relies on an index's order width
/// being independent of field values.
#[derive(Debug, Default)]
pub struct IndexOrder {
    buf: Vec<u8>,
}

impl IndexOrder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn order_bool(self, b: bool, direction: Direction) -> Self {
        self.field(direction, |buf| keycode::encode_bool(buf, b))
    }

    pub fn order_u8(self, i: u8, direction: Direction) -> Self {
        self.field(direction, |buf| keycode::encode_u8(buf, i))
    }

    pub fn order_u16(self, i: u16, direction: Direction) -> Self {
        self.field(direction, |buf| keycode::encode_u16(buf, i))
    }

    pub fn order_u32(self, i: u32, direction: Direction) -> Self {
        self.field(direction, |buf| keycode::encode_u32(buf, i))
    }

    pub fn order_u64(self, i: u64, direction: Direction) -> Self {
        self.field(direction, |buf| keycode::encode_u64(buf, i))
    }

    pub fn order_i8(self, i: i8, direction: Direction) -> Self {
        self.field(direction, |buf| keycode::encode_i8(buf, i))
    }

    pub fn order_i16(self, i: i16, direction: Direction) -> Self {
        self.field(direction, |buf| keycode::encode_i16(buf, i))
    }

    pub fn order_i32(self, i: i32, direction: Direction) -> Self {
        self.field(direction, |buf| keycode::encode_i32(buf, i))
    }

    pub fn order_i64(self, i: i64, direction: Direction) -> Self {
        self.field(direction, |buf| keycode::encode_i64(buf, i))
    }

    /// The accumulated order bytes.
    pub fn bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    fn field(mut self, direction: Direction, encode: impl FnOnce(&mut Vec<u8>)) -> Self {
        let start = self.buf.len();
        encode(&mut self.buf);
        if direction == Direction::Desc {
            for byte in &mut self.buf[start..] {
                *byte = !*byte;
            }
        }
        self
    }
}

/// Projects a record into the index key suffix.
pub type IndexKeyFn<R> = dyn Fn(KeyBuilder, &R) -> Vec<u8> + Send + Sync;

/// Projects a record into the index order bytes.
pub type IndexOrderFn<R> = dyn Fn(IndexOrder, &R) -> IndexOrder + Send + Sync;

/// Decides index membership for partial indexes.
pub type IndexFilterFn<R> = dyn Fn(&R) -> bool + Send + Sync;

/// A secondary index over records of one table.
pub struct Index<R> {
    id: IndexId,
    name: String,
    key_fn: Box<IndexKeyFn<R>>,
    order_fn: Box<IndexOrderFn<R>>,
    filter_fn: Option<Box<IndexFilterFn<R>>>,
}

impl<R> Index<R> {
    /// Create an index with the given id, name, and key projector. The
    /// default order is empty, which sorts entries within one index key by
    /// ascending primary key.
    pub fn new(
        id: IndexId,
        name: impl Into<String>,
        key_fn: impl Fn(KeyBuilder, &R) -> Vec<u8> + Send + Sync + 'static,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            key_fn: Box::new(key_fn),
            order_fn: Box::new(|order, _| order),
            filter_fn: None,
        }
    }

    /// Set the order projector.
    pub fn with_order(
        mut self,
        order_fn: impl Fn(IndexOrder, &R) -> IndexOrder + Send + Sync + 'static,
    ) -> Self {
        self.order_fn = Box::new(order_fn);
        self
    }

    /// Make this a partial index: only rows passing the predicate are
    /// indexed.
    pub fn with_filter(mut self, filter_fn: impl Fn(&R) -> bool + Send + Sync + 'static) -> Self {
        self.filter_fn = Some(Box::new(filter_fn));
        self
    }

    pub fn id(&self) -> IndexId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The index key suffix for a record.
    pub fn key_of(&self, record: &R) -> Vec<u8> {
        (self.key_fn)(KeyBuilder::new(), record)
    }

    /// The order bytes for a record.
    pub fn order_of(&self, record: &R) -> Vec<u8> {
        (self.order_fn)(IndexOrder::new(), record).bytes()
    }

    /// Whether a record belongs in this index.
    pub fn should_index(&self, record: &R) -> bool {
        self.filter_fn.as_ref().map_or(true, |filter| filter(record))
    }
}

impl<R> std::fmt::Debug for Index<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Index")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("partial", &self.filter_fn.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Balance {
        account: String,
        amount: u64,
        active: bool,
    }

    fn acct_index() -> Index<Balance> {
        Index::new(1, "acct_idx", |builder, balance: &Balance| {
            builder.add_string(&balance.account).bytes()
        })
    }

    #[test]
    fn test_key_projection() {
        let index = acct_index();
        let row = Balance { account: "a".into(), amount: 1, active: true };
        assert_eq!(index.key_of(&row), KeyBuilder::new().add_string("a").bytes());
        assert_eq!(index.id(), 1);
        assert_eq!(index.name(), "acct_idx");
    }

    #[test]
    fn test_default_order_is_empty() {
        let index = acct_index();
        let row = Balance { account: "a".into(), amount: 9, active: true };
        assert!(index.order_of(&row).is_empty());
    }

    #[test]
    fn test_desc_order_reverses() {
        let index = acct_index()
            .with_order(|order, balance: &Balance| order.order_u64(balance.amount, Direction::Desc));

        let low = Balance { account: "a".into(), amount: 5, active: true };
        let high = Balance { account: "a".into(), amount: 15, active: true };
        assert!(index.order_of(&high) < index.order_of(&low));
    }

    #[test]
    fn test_asc_order_preserves() {
        let index = acct_index()
            .with_order(|order, balance: &Balance| order.order_u64(balance.amount, Direction::Asc));

        let low = Balance { account: "a".into(), amount: 5, active: true };
        let high = Balance { account: "a".into(), amount: 15, active: true };
        assert!(index.order_of(&low) < index.order_of(&high));
    }

    #[test]
    fn test_order_width_is_value_independent() {
        let index = acct_index()
            .with_order(|order, balance: &Balance| order.order_u64(balance.amount, Direction::Desc));

        let a = Balance { account: "a".into(), amount: 0, active: true };
        let b = Balance { account: "zzz".into(), amount: u64::MAX, active: false };
        assert_eq!(index.order_of(&a).len(), index.order_of(&b).len());
    }

    #[test]
    fn test_multi_field_order_tie_break() {
        let index = acct_index().with_order(|order, balance: &Balance| {
            order
                .order_bool(balance.active, Direction::Desc)
                .order_u64(balance.amount, Direction::Asc)
        });

        let active_small = Balance { account: "a".into(), amount: 1, active: true };
        let active_large = Balance { account: "a".into(), amount: 2, active: true };
        let inactive = Balance { account: "a".into(), amount: 0, active: false };

        // Active rows first (desc bool), then ascending amount.
        assert!(index.order_of(&active_small) < index.order_of(&active_large));
        assert!(index.order_of(&active_large) < index.order_of(&inactive));
    }

    #[test]
    fn test_partial_index_filter() {
        let index = acct_index().with_filter(|balance: &Balance| balance.amount > 0);
        let empty = Balance { account: "a".into(), amount: 0, active: true };
        let funded = Balance { account: "a".into(), amount: 1, active: true };
        assert!(!index.should_index(&empty));
        assert!(index.should_index(&funded));
    }
}
