//! B-tree engine - an ordered set of `i32` keys kept in a paged file.
//!
//! [`BTree`] owns a [`PagedStore`] and runs every algorithm on private
//! node copies: descend, mutate, write back. Nothing is cached between
//! operations, so every call reads the pages it needs from the file.

use std::path::Path;

use crate::common::{Error, NodeRef, Result};
use crate::index::btree::iter::{Cursor, Iter};
use crate::index::btree::node::{Node, Route};
use crate::storage::{IoStats, PagedStore};

/// An under-filled node that its parent could not fix because the parent
/// has no second child to merge with.
///
/// The grandparent merges the parent with a sibling first, which gives the
/// node a neighbour; `below` repeats the same for the next level down.
struct Deficit {
    node: Node,
    below: Option<Box<Deficit>>,
}

/// A disk-backed B-tree set of `i32` keys.
///
/// # Shape
/// ```text
///                    ┌──────────────────────┐
///                    │ S │ 10 │ 40          │   internal: sentinel + entries
///                    └─┬───┬────┬──────────┘
///          ┌───────────┘   │    └─────────────┐
///     ┌────▼─────┐   ┌─────▼──────┐   ┌───────▼────┐
///     │ -5  3  7 │   │ 10 12 31   │   │ 40 41 77   │  leaves
///     └──────────┘   └────────────┘   └────────────┘
/// ```
/// The sentinel child holds every key below the first entry; the child
/// stored under key `k` holds keys in `[k, next_key)` and its smallest key
/// is exactly `k`. Only nodes on the leftmost path carry a sentinel.
///
/// # Fill
/// A node is full above `order` keys and is split right away. Every node
/// but the root keeps at least `order / 2` keys.
///
/// # Example
/// ```no_run
/// use pagetree::BTree;
///
/// let mut tree = BTree::create("keys.tree", 4)?;
/// for key in [5, -3, 12] {
///     tree.put(key)?;
/// }
/// assert!(tree.contains(12)?);
/// assert_eq!(tree.min_key()?, -3);
///
/// let keys: Vec<i32> = tree.iter()?.collect::<Result<_, _>>()?;
/// assert_eq!(keys, vec![-3, 5, 12]);
/// # Ok::<(), pagetree::Error>(())
/// ```
pub struct BTree {
    store: PagedStore,
    order: usize,
    height: usize,
    size: u64,
    root: NodeRef,
}

impl BTree {
    /// Create a new, empty tree file at `path`.
    ///
    /// An existing file at `path` is replaced.
    ///
    /// # Errors
    /// - `Error::InvalidOrder` if `order` is below 2 or needs pages over 32KB
    /// - `Error::FileLocked` if the file is open elsewhere
    pub fn create<P: AsRef<Path>>(path: P, order: usize) -> Result<Self> {
        let mut store = PagedStore::create(path, order)?;
        let root = store.allocate(true)?;
        store.write_node(&root)?;

        let mut tree = Self {
            store,
            order,
            height: 0,
            size: 0,
            root: root.reference(),
        };
        tree.sync_header()?;
        Ok(tree)
    }

    /// Open an existing tree file.
    ///
    /// # Errors
    /// - `Error::FileNotFound` if there is no file at `path`
    /// - `Error::FileLocked` if the file is open elsewhere
    /// - `Error::Corrupt` if the header and root node disagree
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let store = PagedStore::open(path)?;
        let root = store.read_node(store.root())?;
        if root.order() != store.order() {
            return Err(Error::Corrupt {
                reference: root.reference(),
                reason: format!(
                    "root has order {} but pages are sized for {}",
                    root.order(),
                    store.order()
                ),
            });
        }

        Ok(Self {
            order: store.order(),
            height: store.tree_height(),
            size: store.tree_size(),
            root: root.reference(),
            store,
        })
    }

    /// Flush the header, sync the file and release it.
    pub fn close(mut self) -> Result<()> {
        self.sync_header()?;
        self.store.close()
    }

    /// Number of keys in the tree.
    #[inline]
    pub fn size(&self) -> u64 {
        self.size
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Number of internal levels above the leaves (0 for a single leaf).
    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn order(&self) -> usize {
        self.order
    }

    /// Page I/O counters of the underlying store.
    #[inline]
    pub fn io_stats(&self) -> &IoStats {
        self.store.stats()
    }

    #[inline]
    fn min_keys(&self) -> usize {
        self.order / 2
    }

    // ========================================================================
    // Lookup
    // ========================================================================

    /// Whether `key` is in the tree.
    pub fn contains(&self, key: i32) -> Result<bool> {
        Ok(self.find_leaf(key)?.contains_key(key))
    }

    /// Smallest key in the tree.
    ///
    /// # Errors
    /// Returns `Error::EmptyTree` if the tree has no keys.
    pub fn min_key(&self) -> Result<i32> {
        if self.size == 0 {
            return Err(Error::EmptyTree);
        }
        let mut node = self.store.read_node(self.root)?;
        while !node.is_leaf() {
            node = self.store.read_node(node.first_child())?;
        }
        node.min_key()
    }

    /// Smallest key strictly greater than `key`, or `None` if there is none.
    ///
    /// `key` itself need not be in the tree.
    pub fn successor(&self, key: i32) -> Result<Option<i32>> {
        let mut node = self.store.read_node(self.root)?;
        // Separator of the nearest subtree to the right of the path.
        let mut fallback = None;
        while !node.is_leaf() {
            let route = node.route_for(key);
            if let Some(next) = node.key_after_route(route) {
                fallback = Some(next);
            }
            node = self.store.read_node(node.child_at(route))?;
        }
        Ok(node.key_after(key).or(fallback))
    }

    /// Cursor positioned at the smallest key, or at the end if empty.
    pub fn cursor(&self) -> Result<Cursor<'_>> {
        if self.size == 0 {
            return Ok(Cursor::end(self));
        }
        Ok(Cursor::at(self, self.min_key()?))
    }

    /// Iterate over all keys in ascending order.
    pub fn iter(&self) -> Result<Iter<'_>> {
        Ok(Iter::new(self.cursor()?))
    }

    fn find_leaf(&self, key: i32) -> Result<Node> {
        let mut node = self.store.read_node(self.root)?;
        while !node.is_leaf() {
            node = self.store.read_node(node.next_child_for(key))?;
        }
        Ok(node)
    }

    // ========================================================================
    // Insertion
    // ========================================================================

    /// Insert `key`.
    ///
    /// # Errors
    /// Returns `Error::DuplicateKey` if `key` is already present; the file
    /// is left untouched in that case.
    pub fn put(&mut self, key: i32) -> Result<()> {
        let mut root = self.store.read_node(self.root)?;
        self.put_into(&mut root, key)?;
        self.size += 1;

        if root.is_full() {
            let sibling = self.split(&mut root)?;
            let mut new_root = self.store.allocate(false)?;
            new_root.set_sentinel(root.reference());
            new_root.insert_child_pointer(&sibling)?;
            self.store.write_node(&new_root)?;

            self.root = new_root.reference();
            self.height += 1;
            tracing::debug!(root = %self.root, height = self.height, "tree grew");
        }

        self.sync_header()
    }

    fn put_into(&mut self, node: &mut Node, key: i32) -> Result<()> {
        if node.is_leaf() {
            node.insert_leaf_key(key)?;
            return self.store.write_node(node);
        }

        let mut child = self.store.read_node(node.next_child_for(key))?;
        self.put_into(&mut child, key)?;

        if child.is_full() {
            let sibling = self.split(&mut child)?;
            node.insert_child_pointer(&sibling)?;
            self.store.write_node(node)?;
        }
        Ok(())
    }

    /// Move the `order / 2` largest entries of `node` into a new sibling.
    ///
    /// Both nodes are written; the sibling is returned so the caller can
    /// route to it.
    fn split(&mut self, node: &mut Node) -> Result<Node> {
        let mut sibling = self.store.allocate(node.is_leaf())?;
        sibling.append_entries(node.split_off_high(self.order / 2));

        self.store.write_node(node)?;
        self.store.write_node(&sibling)?;
        tracing::debug!(
            node = %node.reference(),
            sibling = %sibling.reference(),
            kept = node.key_count(),
            moved = sibling.key_count(),
            "split node"
        );
        Ok(sibling)
    }

    // ========================================================================
    // Removal
    // ========================================================================

    /// Remove `key`.
    ///
    /// # Errors
    /// Returns `Error::MissingKey` if `key` is not present; the file is left
    /// untouched in that case.
    pub fn remove(&mut self, key: i32) -> Result<()> {
        let mut root = self.store.read_node(self.root)?;
        // A deficit that reaches the root hangs off a chain of single-child
        // nodes, which the collapse below strips away.
        let _ = self.remove_from(&mut root, key)?;
        self.size -= 1;

        while !root.is_leaf() && root.key_count() == 0 {
            root = self.store.read_node(root.sentinel())?;
            self.height -= 1;
            tracing::debug!(root = %root.reference(), height = self.height, "tree shrank");
        }
        self.root = root.reference();

        self.sync_header()
    }

    fn remove_from(&mut self, node: &mut Node, key: i32) -> Result<Option<Box<Deficit>>> {
        if node.is_leaf() {
            node.remove_key(key)?;
            self.store.write_node(node)?;
            return Ok(None);
        }

        let mut route = node.route_for(key);
        let mut child = self.store.read_node(node.child_at(route))?;
        let below = self.remove_from(&mut child, key)?;
        let mut changed = false;

        // The removed key may have been the child's minimum.
        if let (Route::Entry(separator), Some(min)) = (route, child.first_key()) {
            if min != separator {
                node.rekey(separator, min)?;
                route = Route::Entry(min);
                changed = true;
            }
        }

        let mut pending = None;
        if child.key_count() < self.min_keys() || below.is_some() {
            pending = self.rebalance(node, route, child, below)?;
            changed |= pending.is_none();
        }

        if changed {
            self.store.write_node(node)?;
        }
        Ok(pending)
    }

    /// Merge `child` with an adjacent sibling under `parent`, splitting the
    /// result again if it overflows.
    ///
    /// `parent` is modified but not written. When `parent` has no second
    /// child the work is handed back up as a [`Deficit`].
    fn rebalance(
        &mut self,
        parent: &mut Node,
        route: Route,
        child: Node,
        below: Option<Box<Deficit>>,
    ) -> Result<Option<Box<Deficit>>> {
        if parent.child_count() < 2 {
            return Ok(Some(Box::new(Deficit { node: child, below })));
        }

        let left_route = match route {
            Route::Entry(key) if parent.last_key() == Some(key) => {
                parent.route_before(key).ok_or_else(|| Error::Corrupt {
                    reference: parent.reference(),
                    reason: format!("no sibling left of entry {key}"),
                })?
            }
            route => route,
        };
        let right_key = parent
            .key_after_route(left_route)
            .ok_or_else(|| Error::Corrupt {
                reference: parent.reference(),
                reason: "no sibling to merge with".to_string(),
            })?;

        let (mut left, right) = if route == left_route {
            let right = self
                .store
                .read_node(parent.child_at(Route::Entry(right_key)))?;
            (child, right)
        } else {
            let left = self.store.read_node(parent.child_at(left_route))?;
            (left, child)
        };

        self.merge(&mut left, right);
        parent.remove_key(right_key)?;

        if let Some(deficit) = below {
            let Deficit { node, below } = *deficit;
            let inner = left.route_to(node.reference()).ok_or_else(|| Error::Corrupt {
                reference: left.reference(),
                reason: format!("lost track of child {}", node.reference()),
            })?;
            // `left` now has the children of two nodes, so this never defers.
            if self.rebalance(&mut left, inner, node, below)?.is_some() {
                return Err(Error::Corrupt {
                    reference: left.reference(),
                    reason: "merged node still has a single child".to_string(),
                });
            }
        }

        if let Route::Entry(separator) = left_route {
            let min = left.min_key()?;
            if min != separator {
                parent.rekey(separator, min)?;
            }
        }

        if left.is_full() {
            let sibling = self.split(&mut left)?;
            parent.insert_child_pointer(&sibling)?;
        } else {
            self.store.write_node(&left)?;
        }
        Ok(None)
    }

    /// Append every entry of `right` to `left`. Nothing is written and
    /// `right`'s page stays allocated.
    fn merge(&self, left: &mut Node, mut right: Node) {
        debug_assert!(right.sentinel().is_null());
        debug_assert_eq!(left.is_leaf(), right.is_leaf());

        let count = right.key_count();
        left.append_entries(right.split_off_high(count));
        tracing::debug!(
            node = %left.reference(),
            absorbed = %right.reference(),
            keys = left.key_count(),
            "merged nodes"
        );
    }

    // ========================================================================
    // Diagnostics
    // ========================================================================

    /// Walk the whole tree and check its structure.
    ///
    /// Returns `Ok(false)` on any broken invariant: over-full or under-filled
    /// nodes, leaves off the declared height, keys outside the range their
    /// parent routes to them, separators that differ from their child's
    /// minimum, or a key count that differs from `size()`.
    pub fn check_valid(&self) -> Result<bool> {
        let Some(root) = self.read_checked(self.root)? else {
            return Ok(false);
        };
        let mut count = 0;
        let valid = self.check_node(&root, self.height, None, None, true, &mut count)?;
        Ok(valid && count == self.size)
    }

    fn check_node(
        &self,
        node: &Node,
        height: usize,
        lower: Option<i32>,
        upper: Option<i32>,
        is_root: bool,
        count: &mut u64,
    ) -> Result<bool> {
        let in_range =
            |key: i32| lower.map_or(true, |l| key >= l) && upper.map_or(true, |u| key < u);

        if node.order() != self.order || node.is_full() {
            return Ok(false);
        }
        if !is_root && node.key_count() < self.min_keys() {
            return Ok(false);
        }
        if !node.keys().all(in_range) {
            return Ok(false);
        }

        if node.is_leaf() {
            *count += node.key_count() as u64;
            return Ok(height == 0);
        }
        if height == 0 || node.child_count() == 0 {
            return Ok(false);
        }

        if let Some(sentinel) = node.sentinel().non_null() {
            let Some(child) = self.read_checked(sentinel)? else {
                return Ok(false);
            };
            let bound = node.first_key().or(upper);
            if !self.check_node(&child, height - 1, lower, bound, false, count)? {
                return Ok(false);
            }
        }

        let entries: Vec<(i32, NodeRef)> = node.entries().collect();
        for (i, &(key, child_ref)) in entries.iter().enumerate() {
            let Some(child) = self.read_checked(child_ref)? else {
                return Ok(false);
            };
            if child.first_key() != Some(key) {
                return Ok(false);
            }
            let bound = entries.get(i + 1).map(|&(next, _)| next).or(upper);
            if !self.check_node(&child, height - 1, Some(key), bound, false, count)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Read a node, mapping structural read failures to `None`.
    fn read_checked(&self, reference: NodeRef) -> Result<Option<Node>> {
        match self.store.read_node(reference) {
            Ok(node) => Ok(Some(node)),
            Err(Error::InvalidReference(_) | Error::Corrupt { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Render the tree in pre-order, one `level: k1,k2,` line per node.
    ///
    /// Meant for debugging; the format is not stable.
    pub fn dump(&self) -> Result<String> {
        let mut out = String::new();
        let root = self.store.read_node(self.root)?;
        self.dump_node(&root, 0, &mut out)?;
        Ok(out)
    }

    fn dump_node(&self, node: &Node, level: usize, out: &mut String) -> Result<()> {
        let keys: String = node.keys().map(|key| format!("{key},")).collect();
        out.push_str(&format!("{level}: {keys}\n"));

        if !node.is_leaf() {
            let children = node
                .sentinel()
                .non_null()
                .into_iter()
                .chain(node.entries().map(|(_, child)| child));
            for child in children {
                let child = self.store.read_node(child)?;
                self.dump_node(&child, level + 1, out)?;
            }
        }
        Ok(())
    }

    fn sync_header(&mut self) -> Result<()> {
        self.store.set_root(self.root);
        self.store.set_tree_size(self.size);
        self.store.set_tree_height(self.height);
        self.store.flush_header()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn create_tree(order: usize) -> (BTree, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let tree = BTree::create(dir.path().join("test.tree"), order).unwrap();
        (tree, dir)
    }

    #[test]
    fn test_create_empty() {
        let (tree, _dir) = create_tree(4);
        assert_eq!(tree.size(), 0);
        assert_eq!(tree.height(), 0);
        assert_eq!(tree.order(), 4);
        assert!(tree.is_empty());
        assert!(!tree.contains(0).unwrap());
        assert!(tree.check_valid().unwrap());
    }

    #[test]
    fn test_create_rejects_bad_order() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            BTree::create(dir.path().join("a.tree"), 1),
            Err(Error::InvalidOrder { order: 1, .. })
        ));
        assert!(matches!(
            BTree::create(dir.path().join("b.tree"), 2728),
            Err(Error::InvalidOrder { order: 2728, .. })
        ));
    }

    #[test]
    fn test_min_key_empty_tree() {
        let (tree, _dir) = create_tree(4);
        assert!(matches!(tree.min_key(), Err(Error::EmptyTree)));
    }

    #[test]
    fn test_root_split() {
        let (mut tree, _dir) = create_tree(2);
        for key in [1, 2, 3] {
            tree.put(key).unwrap();
        }

        assert_eq!(tree.height(), 1);
        assert_eq!(tree.size(), 3);
        assert_eq!(tree.dump().unwrap(), "0: 3,\n1: 1,2,\n1: 3,\n");
        assert!(tree.check_valid().unwrap());
    }

    #[test]
    fn test_duplicate_leaves_file_untouched() {
        let (mut tree, _dir) = create_tree(4);
        tree.put(46).unwrap();

        let writes = tree.io_stats().snapshot().pages_written;
        assert!(matches!(tree.put(46), Err(Error::DuplicateKey(46))));
        assert_eq!(tree.io_stats().snapshot().pages_written, writes);
        assert_eq!(tree.size(), 1);
    }

    #[test]
    fn test_missing_leaves_file_untouched() {
        let (mut tree, _dir) = create_tree(4);
        tree.put(1).unwrap();

        let writes = tree.io_stats().snapshot().pages_written;
        assert!(matches!(tree.remove(2), Err(Error::MissingKey(2))));
        assert_eq!(tree.io_stats().snapshot().pages_written, writes);
        assert_eq!(tree.size(), 1);
    }

    #[test]
    fn test_remove_collapses_root() {
        let (mut tree, _dir) = create_tree(2);
        for key in [1, 2, 3] {
            tree.put(key).unwrap();
        }

        tree.remove(3).unwrap();

        assert_eq!(tree.height(), 0);
        assert_eq!(tree.size(), 2);
        assert_eq!(tree.dump().unwrap(), "0: 1,2,\n");
        assert!(tree.check_valid().unwrap());
    }

    #[test]
    fn test_remove_separator_key() {
        let (mut tree, _dir) = create_tree(4);
        for key in 0..20 {
            tree.put(key).unwrap();
        }
        assert!(tree.height() >= 1);

        // Every key that starts a leaf is also a separator somewhere.
        for key in (0..20).step_by(3) {
            tree.remove(key).unwrap();
            assert!(!tree.contains(key).unwrap());
            assert!(tree.check_valid().unwrap(), "invalid after removing {key}");
        }
    }

    #[test]
    fn test_successor() {
        let (mut tree, _dir) = create_tree(3);
        for key in [1, -1, 5, 6, 18, 23, -8, -76] {
            tree.put(key).unwrap();
        }

        assert_eq!(tree.successor(-100).unwrap(), Some(-76));
        assert_eq!(tree.successor(-76).unwrap(), Some(-8));
        assert_eq!(tree.successor(2).unwrap(), Some(5));
        assert_eq!(tree.successor(6).unwrap(), Some(18));
        assert_eq!(tree.successor(23).unwrap(), None);
        assert_eq!(tree.successor(i32::MAX).unwrap(), None);
    }

    #[test]
    fn test_min_key_multi_level() {
        let (mut tree, _dir) = create_tree(2);
        for key in (0..30).rev() {
            tree.put(key).unwrap();
        }
        assert_eq!(tree.min_key().unwrap(), 0);

        tree.remove(0).unwrap();
        assert_eq!(tree.min_key().unwrap(), 1);
    }

    #[test]
    fn test_drain_to_empty() {
        let (mut tree, _dir) = create_tree(3);
        for key in 0..50 {
            tree.put(key).unwrap();
        }
        for key in 0..50 {
            tree.remove(key).unwrap();
            assert!(tree.check_valid().unwrap(), "invalid after removing {key}");
        }

        assert!(tree.is_empty());
        assert_eq!(tree.height(), 0);
        assert!(tree.iter().unwrap().next().is_none());
    }

    #[test]
    fn test_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.tree");

        {
            let mut tree = BTree::create(&path, 5).unwrap();
            for key in 0..100 {
                tree.put(key * 7).unwrap();
            }
            tree.close().unwrap();
        }

        let tree = BTree::open(&path).unwrap();
        assert_eq!(tree.order(), 5);
        assert_eq!(tree.size(), 100);
        assert!(tree.contains(693).unwrap());
        assert!(!tree.contains(694).unwrap());
        assert!(tree.check_valid().unwrap());
    }

    #[test]
    fn test_check_valid_detects_size_mismatch() {
        let (mut tree, _dir) = create_tree(4);
        tree.put(1).unwrap();
        tree.size = 2;
        assert!(!tree.check_valid().unwrap());
    }
}
