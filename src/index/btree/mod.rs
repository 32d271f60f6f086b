//! B-tree index over a paged file.
//!
//! This module contains:
//! - [`Node`] - One tree page in memory, with its byte encoding
//! - [`BTree`] - The tree engine: insert, remove, lookup, validation
//! - [`Cursor`] / [`Iter`] - Ascending iteration by successor lookups

mod iter;
mod node;
mod tree;

pub use iter::{Cursor, Iter};
pub use node::Node;
pub use tree::BTree;
