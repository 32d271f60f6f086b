//! Node reference type.

use std::fmt;

/// Identifies a B-tree node on disk.
///
/// A reference is the byte offset of the node's page inside the tree file,
/// which also makes it the node's persistent identity. Offset `0` lies
/// inside the file header and can never start a page, so it doubles as
/// "no node".
///
/// # Example
/// ```
/// use pagetree::NodeRef;
///
/// let node_ref = NodeRef::new(32);
/// assert!(!node_ref.is_null());
/// assert_eq!(node_ref.offset(), 32);
/// assert!(NodeRef::NULL.is_null());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct NodeRef(pub u64);

impl NodeRef {
    /// The reserved "no node" reference.
    pub const NULL: NodeRef = NodeRef(0);

    /// Create a new NodeRef from a byte offset.
    #[inline]
    pub fn new(offset: u64) -> Self {
        NodeRef(offset)
    }

    /// Byte offset of the referenced page.
    #[inline]
    pub fn offset(&self) -> u64 {
        self.0
    }

    /// Check if this is the null reference.
    #[inline]
    pub fn is_null(&self) -> bool {
        *self == Self::NULL
    }

    /// `None` for the null reference, `Some(self)` otherwise.
    #[inline]
    pub fn non_null(self) -> Option<Self> {
        if self.is_null() {
            None
        } else {
            Some(self)
        }
    }
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            write!(f, "Node(NULL)")
        } else {
            write!(f, "Node({})", self.0)
        }
    }
}
