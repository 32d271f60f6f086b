//! Error types for pagetree.

use std::path::PathBuf;

use thiserror::Error;

use crate::common::NodeRef;

/// Convenient Result type alias.
///
/// Instead of writing `Result<T, Error>` everywhere, we can write `Result<T>`.
pub type Result<T> = std::result::Result<T, Error>;

/// All possible errors in pagetree.
///
/// Every variant aborts the operation in progress. Nothing is retried:
/// I/O is assumed local, so a short read or write is a structural fault
/// rather than a transient condition.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error from file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Insert of a key that is already in the tree.
    #[error("key {0} already exists")]
    DuplicateKey(i32),

    /// Remove of a key that is not in the tree (or not in a node).
    #[error("key {0} not found")]
    MissingKey(i32),

    /// A node reference outside the allocated, page-aligned region.
    #[error("invalid node reference: {0}")]
    InvalidReference(NodeRef),

    /// A page read or write transferred fewer bytes than a full page.
    #[error("short {operation} at {reference}: expected {expected} bytes, got {actual}")]
    ShortIo {
        operation: &'static str,
        reference: NodeRef,
        expected: usize,
        actual: usize,
    },

    /// The tree file does not exist.
    #[error("tree file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// The tree file is held open exclusively by someone else.
    #[error("tree file is locked by another handle: {}", .0.display())]
    FileLocked(PathBuf),

    /// The requested order cannot be used.
    #[error("invalid order {order}: {reason}")]
    InvalidOrder { order: usize, reason: String },

    /// Minimum-key query on a tree with no elements.
    #[error("tree is empty")]
    EmptyTree,

    /// Minimum/maximum key query on a node with no keys.
    #[error("node {0} has no keys")]
    EmptyNode(NodeRef),

    /// Dereference or advance of a cursor that is already past the end.
    #[error("cursor is past the end")]
    CursorExhausted,

    /// Page or header bytes that do not describe a valid structure.
    #[error("corrupt page at {reference}: {reason}")]
    Corrupt { reference: NodeRef, reason: String },
}
