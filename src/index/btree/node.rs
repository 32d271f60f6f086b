//! B-tree node - the in-memory form of one tree page.
//!
//! A [`Node`] is either a leaf (a plain set of keys) or an internal node
//! (routing entries from a separator key to a child reference, plus an
//! optional sentinel child for keys below the first separator).
//!
//! Nodes never touch the file. The paged store hands out private copies;
//! the tree mutates them and writes them back explicitly.

use std::collections::BTreeMap;
use std::ops::Bound::{Excluded, Unbounded};

use crate::common::config::{self, ENTRY_LEN, NODE_PREFIX_LEN};
use crate::common::{Error, NodeRef, Result};

/// Which child of an internal node a key descends into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Route {
    /// The implicit leftmost child.
    Sentinel,
    /// The child stored under this separator key.
    Entry(i32),
}

/// One B-tree node.
///
/// # Page Layout
/// ```text
/// Offset  Size  Field
/// ------  ----  -----
/// 0       4     order (i32)
/// 4       4     key_count (i32)
/// 8       8     reference (u64)
/// 16      1     is_leaf (u8, 0 or 1)
/// 17      8     sentinel (u64)
/// 25      12*n  entries: key (i32) + value (u64), ascending by key
/// ```
/// All integers are little-endian. Leaf entries carry a zero value.
///
/// # Example
/// ```
/// use pagetree::{Node, NodeRef};
///
/// let mut leaf = Node::new(4, NodeRef::new(32), true);
/// leaf.insert_leaf_key(7).unwrap();
/// leaf.insert_leaf_key(3).unwrap();
/// assert_eq!(leaf.min_key().unwrap(), 3);
/// assert!(leaf.insert_leaf_key(7).is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    order: usize,
    reference: NodeRef,
    is_leaf: bool,
    sentinel: NodeRef,
    /// Key -> child reference. Always `NodeRef::NULL` in leaves.
    keys: BTreeMap<i32, NodeRef>,
}

impl Node {
    pub const OFFSET_ORDER: usize = 0;
    pub const OFFSET_KEY_COUNT: usize = 4;
    pub const OFFSET_REFERENCE: usize = 8;
    pub const OFFSET_IS_LEAF: usize = 16;
    pub const OFFSET_SENTINEL: usize = 17;
    pub const OFFSET_ENTRIES: usize = NODE_PREFIX_LEN;

    /// Create an empty node bound to `reference`.
    pub fn new(order: usize, reference: NodeRef, is_leaf: bool) -> Self {
        Self {
            order,
            reference,
            is_leaf,
            sentinel: NodeRef::NULL,
            keys: BTreeMap::new(),
        }
    }

    /// Upper bound on the encoded size of a node for `order`.
    #[inline]
    pub const fn max_encoded_size(order: usize) -> usize {
        config::max_encoded_size(order)
    }

    #[inline]
    pub fn order(&self) -> usize {
        self.order
    }

    #[inline]
    pub fn reference(&self) -> NodeRef {
        self.reference
    }

    #[inline]
    pub fn is_leaf(&self) -> bool {
        self.is_leaf
    }

    #[inline]
    pub fn sentinel(&self) -> NodeRef {
        self.sentinel
    }

    #[inline]
    pub fn set_sentinel(&mut self, sentinel: NodeRef) {
        self.sentinel = sentinel;
    }

    /// Number of keys (leaf) or explicit routing entries (internal).
    #[inline]
    pub fn key_count(&self) -> usize {
        self.keys.len()
    }

    /// A node is full once it holds more than `order` keys.
    #[inline]
    pub fn is_full(&self) -> bool {
        self.keys.len() > self.order
    }

    /// Keys in ascending order.
    pub fn keys(&self) -> impl DoubleEndedIterator<Item = i32> + '_ {
        self.keys.keys().copied()
    }

    /// `(key, child)` entries in ascending key order.
    pub fn entries(&self) -> impl DoubleEndedIterator<Item = (i32, NodeRef)> + '_ {
        self.keys.iter().map(|(&k, &v)| (k, v))
    }

    #[inline]
    pub fn contains_key(&self, key: i32) -> bool {
        self.keys.contains_key(&key)
    }

    /// Smallest key.
    ///
    /// # Errors
    /// Returns `Error::EmptyNode` if the node has no keys.
    pub fn min_key(&self) -> Result<i32> {
        self.first_key().ok_or(Error::EmptyNode(self.reference))
    }

    /// Largest key.
    ///
    /// # Errors
    /// Returns `Error::EmptyNode` if the node has no keys.
    pub fn max_key(&self) -> Result<i32> {
        self.last_key().ok_or(Error::EmptyNode(self.reference))
    }

    #[inline]
    pub fn first_key(&self) -> Option<i32> {
        self.keys.keys().next().copied()
    }

    #[inline]
    pub fn last_key(&self) -> Option<i32> {
        self.keys.keys().next_back().copied()
    }

    /// Smallest key strictly greater than `key`.
    pub fn key_after(&self, key: i32) -> Option<i32> {
        self.keys.range((Excluded(key), Unbounded)).next().map(|(&k, _)| k)
    }

    /// Child that would hold `key`: the entry with the greatest key `<= key`,
    /// or the sentinel if every explicit key is greater.
    pub fn next_child_for(&self, key: i32) -> NodeRef {
        self.child_at(self.route_for(key))
    }

    /// Reference of the child after the entry for `key`, or `NULL`.
    pub fn neighbor_after(&self, key: i32) -> NodeRef {
        if !self.keys.contains_key(&key) {
            return NodeRef::NULL;
        }
        self.keys
            .range((Excluded(key), Unbounded))
            .next()
            .map_or(NodeRef::NULL, |(_, &child)| child)
    }

    /// Reference of the child before the entry for `key`, or `NULL`.
    ///
    /// The sentinel is not an entry, so the first entry has no neighbour
    /// before it.
    pub fn neighbor_before(&self, key: i32) -> NodeRef {
        if !self.keys.contains_key(&key) {
            return NodeRef::NULL;
        }
        self.keys
            .range(..key)
            .next_back()
            .map_or(NodeRef::NULL, |(_, &child)| child)
    }

    /// Add a key to a leaf.
    ///
    /// # Errors
    /// Returns `Error::DuplicateKey` if the key is already present.
    pub fn insert_leaf_key(&mut self, key: i32) -> Result<()> {
        if self.keys.contains_key(&key) {
            return Err(Error::DuplicateKey(key));
        }
        self.keys.insert(key, NodeRef::NULL);
        Ok(())
    }

    /// Add a routing entry for `child`, keyed at the child's minimum key.
    ///
    /// # Errors
    /// Returns `Error::EmptyNode` if `child` has no keys, or
    /// `Error::DuplicateKey` if that separator is already routed.
    pub fn insert_child_pointer(&mut self, child: &Node) -> Result<()> {
        let key = child.min_key()?;
        if self.keys.contains_key(&key) {
            return Err(Error::DuplicateKey(key));
        }
        self.keys.insert(key, child.reference);
        Ok(())
    }

    /// Remove `key` and return the child it routed to (`NULL` for leaves).
    ///
    /// # Errors
    /// Returns `Error::MissingKey` if the key is absent.
    pub fn remove_key(&mut self, key: i32) -> Result<NodeRef> {
        self.keys.remove(&key).ok_or(Error::MissingKey(key))
    }

    /// Move the entry under `old` to `new`, keeping its child.
    pub(crate) fn rekey(&mut self, old: i32, new: i32) -> Result<()> {
        let child = self.remove_key(old)?;
        if self.keys.insert(new, child).is_some() {
            return Err(Error::DuplicateKey(new));
        }
        Ok(())
    }

    /// Detach the `count` largest entries, leaving the smaller ones.
    pub(crate) fn split_off_high(&mut self, count: usize) -> BTreeMap<i32, NodeRef> {
        if count == 0 {
            return BTreeMap::new();
        }
        match self.keys.keys().nth_back(count - 1).copied() {
            Some(pivot) => self.keys.split_off(&pivot),
            None => std::mem::take(&mut self.keys),
        }
    }

    /// Append entries that all sort after this node's keys.
    pub(crate) fn append_entries(&mut self, mut entries: BTreeMap<i32, NodeRef>) {
        debug_assert!(match (self.last_key(), entries.keys().next()) {
            (Some(last), Some(&first)) => last < first,
            _ => true,
        });
        self.keys.append(&mut entries);
    }

    // ========================================================================
    // Routing (internal nodes)
    // ========================================================================

    pub(crate) fn route_for(&self, key: i32) -> Route {
        self.keys
            .range(..=key)
            .next_back()
            .map_or(Route::Sentinel, |(&k, _)| Route::Entry(k))
    }

    pub(crate) fn child_at(&self, route: Route) -> NodeRef {
        match route {
            Route::Sentinel => self.sentinel,
            Route::Entry(key) => self.keys.get(&key).copied().unwrap_or(NodeRef::NULL),
        }
    }

    /// Route that currently points at `child`, if any.
    pub(crate) fn route_to(&self, child: NodeRef) -> Option<Route> {
        if !self.sentinel.is_null() && self.sentinel == child {
            return Some(Route::Sentinel);
        }
        self.keys
            .iter()
            .find(|(_, &c)| c == child)
            .map(|(&k, _)| Route::Entry(k))
    }

    /// Separator of the sibling right after `route`.
    pub(crate) fn key_after_route(&self, route: Route) -> Option<i32> {
        match route {
            Route::Sentinel => self.first_key(),
            Route::Entry(key) => self.key_after(key),
        }
    }

    /// Route of the sibling right before the entry for `key`. The first
    /// entry's left sibling is the sentinel, when there is one.
    pub(crate) fn route_before(&self, key: i32) -> Option<Route> {
        match self.keys.range(..key).next_back() {
            Some((&k, _)) => Some(Route::Entry(k)),
            None if !self.sentinel.is_null() => Some(Route::Sentinel),
            None => None,
        }
    }

    /// Leftmost child: the sentinel, or the first entry without one.
    pub(crate) fn first_child(&self) -> NodeRef {
        if !self.sentinel.is_null() {
            return self.sentinel;
        }
        self.keys.values().next().copied().unwrap_or(NodeRef::NULL)
    }

    /// Number of children of an internal node, sentinel included.
    pub(crate) fn child_count(&self) -> usize {
        self.keys.len() + usize::from(!self.sentinel.is_null())
    }

    // ========================================================================
    // Serialization
    // ========================================================================

    /// Number of bytes [`encode`](Self::encode) writes.
    #[inline]
    pub fn encoded_len(&self) -> usize {
        NODE_PREFIX_LEN + self.keys.len() * ENTRY_LEN
    }

    /// Serialize into the front of `buf`, returning the bytes written.
    ///
    /// # Errors
    /// Returns `Error::Corrupt` if the node does not fit in `buf`.
    pub fn encode(&self, buf: &mut [u8]) -> Result<usize> {
        let len = self.encoded_len();
        if len > buf.len() {
            return Err(Error::Corrupt {
                reference: self.reference,
                reason: format!(
                    "node with {} keys needs {len} bytes, page has {}",
                    self.keys.len(),
                    buf.len()
                ),
            });
        }

        write_bytes(buf, Self::OFFSET_ORDER, &(self.order as i32).to_le_bytes());
        write_bytes(buf, Self::OFFSET_KEY_COUNT, &(self.keys.len() as i32).to_le_bytes());
        write_bytes(buf, Self::OFFSET_REFERENCE, &self.reference.0.to_le_bytes());
        buf[Self::OFFSET_IS_LEAF] = u8::from(self.is_leaf);
        write_bytes(buf, Self::OFFSET_SENTINEL, &self.sentinel.0.to_le_bytes());

        let mut offset = Self::OFFSET_ENTRIES;
        for (&key, &child) in &self.keys {
            write_bytes(buf, offset, &key.to_le_bytes());
            write_bytes(buf, offset + 4, &child.0.to_le_bytes());
            offset += ENTRY_LEN;
        }
        Ok(offset)
    }

    /// Deserialize a node from a page.
    ///
    /// # Errors
    /// Returns `Error::Corrupt` if the prefix or the entries it announces
    /// run past the end of `buf`, or the fields are inconsistent.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        let corrupt = |reference: NodeRef, reason: String| Error::Corrupt { reference, reason };

        if buf.len() < NODE_PREFIX_LEN {
            return Err(corrupt(
                NodeRef::NULL,
                format!("page of {} bytes is shorter than the node prefix", buf.len()),
            ));
        }

        let reference = NodeRef(u64::from_le_bytes(read_array(buf, Self::OFFSET_REFERENCE)));
        let order = i32::from_le_bytes(read_array(buf, Self::OFFSET_ORDER));
        let key_count = i32::from_le_bytes(read_array(buf, Self::OFFSET_KEY_COUNT));
        let is_leaf = match buf[Self::OFFSET_IS_LEAF] {
            0 => false,
            1 => true,
            other => return Err(corrupt(reference, format!("bad leaf flag {other}"))),
        };
        let sentinel = NodeRef(u64::from_le_bytes(read_array(buf, Self::OFFSET_SENTINEL)));

        let order = usize::try_from(order)
            .map_err(|_| corrupt(reference, format!("negative order {order}")))?;
        let key_count = usize::try_from(key_count)
            .map_err(|_| corrupt(reference, format!("negative key count {key_count}")))?;

        let needed = key_count
            .checked_mul(ENTRY_LEN)
            .and_then(|n| n.checked_add(NODE_PREFIX_LEN))
            .filter(|&n| n <= buf.len())
            .ok_or_else(|| {
                corrupt(
                    reference,
                    format!("{key_count} keys do not fit in a {}-byte page", buf.len()),
                )
            })?;

        let mut keys = BTreeMap::new();
        let mut offset = Self::OFFSET_ENTRIES;
        while offset < needed {
            let key = i32::from_le_bytes(read_array(buf, offset));
            let child = NodeRef(u64::from_le_bytes(read_array(buf, offset + 4)));
            if keys.last_key_value().is_some_and(|(&last, _)| last >= key) {
                return Err(corrupt(reference, format!("key {key} out of order")));
            }
            keys.insert(key, child);
            offset += ENTRY_LEN;
        }

        Ok(Self {
            order,
            reference,
            is_leaf,
            sentinel,
            keys,
        })
    }
}

fn read_array<const N: usize>(buf: &[u8], offset: usize) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&buf[offset..offset + N]);
    out
}

fn write_bytes(buf: &mut [u8], offset: usize, bytes: &[u8]) {
    buf[offset..offset + bytes.len()].copy_from_slice(bytes);
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    /// Internal node with a sentinel and four routing entries.
    fn routing_node() -> Node {
        let mut node = Node::new(4, NodeRef::new(1_000), false);
        node.set_sentinel(NodeRef::new(53489));
        node.keys.insert(10, NodeRef::new(23423));
        node.keys.insert(23, NodeRef::new(43512));
        node.keys.insert(-3, NodeRef::new(32321));
        node.keys.insert(-674, NodeRef::new(12352));
        node
    }

    fn leaf_with(reference: u64, keys: &[i32]) -> Node {
        let mut leaf = Node::new(4, NodeRef::new(reference), true);
        for &k in keys {
            leaf.insert_leaf_key(k).unwrap();
        }
        leaf
    }

    #[test]
    fn test_roundtrip() {
        let node = routing_node();
        let mut page = vec![0u8; Node::max_encoded_size(4)];

        let written = node.encode(&mut page).unwrap();
        assert_eq!(written, NODE_PREFIX_LEN + 4 * ENTRY_LEN);

        let decoded = Node::decode(&page).unwrap();
        assert_eq!(decoded, node);
    }

    #[test]
    fn test_roundtrip_leaf() {
        let leaf = leaf_with(57, &[5, -2, 99]);
        let mut page = vec![0u8; Node::max_encoded_size(4)];
        leaf.encode(&mut page).unwrap();

        let decoded = Node::decode(&page).unwrap();
        assert_eq!(decoded, leaf);
        assert!(decoded.is_leaf());
        assert!(decoded.sentinel().is_null());
    }

    #[test]
    fn test_byte_layout() {
        let mut node = Node::new(3, NodeRef::new(0x0102), false);
        node.set_sentinel(NodeRef::new(0x0A0B));
        node.keys.insert(-1, NodeRef::new(0x77));
        let mut page = vec![0u8; Node::max_encoded_size(3)];
        node.encode(&mut page).unwrap();

        assert_eq!(&page[0..4], &[3, 0, 0, 0]); // order
        assert_eq!(&page[4..8], &[1, 0, 0, 0]); // key count
        assert_eq!(&page[8..10], &[0x02, 0x01]); // reference LSB first
        assert_eq!(page[16], 0); // internal
        assert_eq!(&page[17..19], &[0x0B, 0x0A]); // sentinel
        assert_eq!(&page[25..29], &[0xFF, 0xFF, 0xFF, 0xFF]); // key -1
        assert_eq!(page[29], 0x77); // child
    }

    #[test]
    fn test_encode_into_small_buffer_fails() {
        let node = routing_node();
        let mut page = vec![0u8; NODE_PREFIX_LEN + ENTRY_LEN];
        assert!(matches!(node.encode(&mut page), Err(Error::Corrupt { .. })));
    }

    #[test]
    fn test_decode_past_bound_fails() {
        let node = routing_node();
        let mut page = vec![0u8; Node::max_encoded_size(4)];
        let written = node.encode(&mut page).unwrap();

        let result = Node::decode(&page[..written - 1]);
        assert!(matches!(result, Err(Error::Corrupt { .. })));
        assert!(Node::decode(&page[..10]).is_err());
    }

    #[test]
    fn test_decode_rejects_unsorted_keys() {
        let mut page = vec![0u8; Node::max_encoded_size(4)];
        leaf_with(32, &[1, 2]).encode(&mut page).unwrap();
        // Swap the two keys in place.
        page[25..29].copy_from_slice(&2i32.to_le_bytes());
        page[37..41].copy_from_slice(&1i32.to_le_bytes());

        assert!(matches!(Node::decode(&page), Err(Error::Corrupt { .. })));
    }

    #[test]
    fn test_min_max_contains() {
        let node = routing_node();
        assert_eq!(node.min_key().unwrap(), -674);
        assert_eq!(node.max_key().unwrap(), 23);

        assert!(node.contains_key(23));
        assert!(node.contains_key(10));
        assert!(node.contains_key(-674));
        assert!(node.contains_key(-3));
        assert!(!node.contains_key(34));
        assert!(!node.contains_key(5));
    }

    #[test]
    fn test_empty_node_min_max_fail() {
        let node = Node::new(4, NodeRef::new(32), true);
        assert!(matches!(node.min_key(), Err(Error::EmptyNode(_))));
        assert!(matches!(node.max_key(), Err(Error::EmptyNode(_))));
    }

    #[test]
    fn test_neighbors() {
        let node = routing_node();
        assert_eq!(node.neighbor_after(10), NodeRef::new(43512));
        assert_eq!(node.neighbor_after(23), NodeRef::NULL);
        assert_eq!(node.neighbor_after(-3), NodeRef::new(23423));
        assert_eq!(node.neighbor_after(-674), NodeRef::new(32321));
        assert_eq!(node.neighbor_after(982), NodeRef::NULL);

        assert_eq!(node.neighbor_before(10), NodeRef::new(32321));
        assert_eq!(node.neighbor_before(23), NodeRef::new(23423));
        assert_eq!(node.neighbor_before(-3), NodeRef::new(12352));
        assert_eq!(node.neighbor_before(-674), NodeRef::NULL);
        assert_eq!(node.neighbor_before(982), NodeRef::NULL);
    }

    #[test]
    fn test_next_child_for() {
        let node = routing_node();
        assert_eq!(node.next_child_for(-1234), NodeRef::new(53489));
        assert_eq!(node.next_child_for(10), NodeRef::new(23423));
        assert_eq!(node.next_child_for(18), NodeRef::new(23423));
        assert_eq!(node.next_child_for(23), NodeRef::new(43512));
        assert_eq!(node.next_child_for(78), NodeRef::new(43512));
        assert_eq!(node.next_child_for(-3), NodeRef::new(32321));
        assert_eq!(node.next_child_for(0), NodeRef::new(32321));
        assert_eq!(node.next_child_for(-674), NodeRef::new(12352));
        assert_eq!(node.next_child_for(-523), NodeRef::new(12352));
    }

    #[test]
    fn test_insert_child_pointer() {
        let mut node = routing_node();
        let child = leaf_with(4_096, &[-5, -1, 4, 8]);

        node.insert_child_pointer(&child).unwrap();
        assert!(node.contains_key(-5));
        assert_eq!(node.key_count(), 5);
        assert_eq!(node.next_child_for(-4), NodeRef::new(4_096));

        let empty = Node::new(4, NodeRef::new(8_192), true);
        assert!(matches!(node.insert_child_pointer(&empty), Err(Error::EmptyNode(_))));
    }

    #[test]
    fn test_leaf_insert_and_remove() {
        let mut leaf = leaf_with(32, &[3, 1, 2]);
        assert_eq!(leaf.key_count(), 3);
        assert!(matches!(leaf.insert_leaf_key(2), Err(Error::DuplicateKey(2))));
        assert_eq!(leaf.key_count(), 3);

        leaf.remove_key(2).unwrap();
        assert_eq!(leaf.key_count(), 2);
        assert!(matches!(leaf.remove_key(2), Err(Error::MissingKey(2))));
        assert_eq!(leaf.keys().collect::<Vec<_>>(), vec![1, 3]);
    }

    #[test]
    fn test_is_full() {
        let mut leaf = leaf_with(32, &[1, 2, 3, 4]);
        assert!(!leaf.is_full());
        leaf.insert_leaf_key(5).unwrap();
        assert!(leaf.is_full());
    }

    #[test]
    fn test_split_off_high_keeps_low_half() {
        let mut leaf = leaf_with(32, &[1, 2, 3, 4, 5]);
        let high = leaf.split_off_high(2);

        assert_eq!(high.keys().copied().collect::<Vec<_>>(), vec![4, 5]);
        assert_eq!(leaf.keys().collect::<Vec<_>>(), vec![1, 2, 3]);

        let mut other = Node::new(4, NodeRef::new(64), true);
        other.append_entries(high);
        assert_eq!(other.min_key().unwrap(), 4);
    }

    #[test]
    fn test_routes() {
        let node = routing_node();
        assert_eq!(node.route_for(-1000), Route::Sentinel);
        assert_eq!(node.route_for(0), Route::Entry(-3));
        assert_eq!(node.child_at(Route::Entry(10)), NodeRef::new(23423));
        assert_eq!(node.route_to(NodeRef::new(53489)), Some(Route::Sentinel));
        assert_eq!(node.route_to(NodeRef::new(43512)), Some(Route::Entry(23)));
        assert_eq!(node.route_to(NodeRef::new(1)), None);

        assert_eq!(node.key_after_route(Route::Sentinel), Some(-674));
        assert_eq!(node.key_after_route(Route::Entry(10)), Some(23));
        assert_eq!(node.key_after_route(Route::Entry(23)), None);

        assert_eq!(node.route_before(-674), Some(Route::Sentinel));
        assert_eq!(node.route_before(10), Some(Route::Entry(-3)));
        assert_eq!(node.child_count(), 5);
        assert_eq!(node.first_child(), NodeRef::new(53489));
    }

    #[test]
    fn test_rekey() {
        let mut node = routing_node();
        node.rekey(10, 12).unwrap();
        assert!(!node.contains_key(10));
        assert_eq!(node.child_at(Route::Entry(12)), NodeRef::new(23423));
        assert!(matches!(node.rekey(99, 100), Err(Error::MissingKey(99))));
    }
}
