//! pagetree - a disk-backed ordered set of `i32` keys stored as a B-tree.
//!
//! # Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                           pagetree                              │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │              Tree Engine (index/btree/)                  │   │
//! │  │   BTree: put / remove / contains / min_key / successor   │   │
//! │  │   Cursor + Iter: ascending walk via successor lookups    │   │
//! │  │   check_valid + dump: structural diagnostics             │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! │                              ↓                                  │
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │              Node Codec (index/btree/node)               │   │
//! │  │     in-memory Node  ←→  fixed-layout page bytes          │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! │                              ↓                                  │
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │              Storage Layer (storage/)                    │   │
//! │  │     PagedStore + FileHeader + Page + IoStats             │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//! - [`common`] - Shared primitives (NodeRef, Error, config)
//! - [`storage`] - File I/O, header and page formats
//! - [`index`] - The B-tree itself
//!
//! # Quick Start
//! ```no_run
//! use pagetree::BTree;
//!
//! // Create a new tree file with order 100
//! let mut tree = BTree::create("numbers.tree", 100).unwrap();
//! tree.put(42).unwrap();
//! tree.close().unwrap();
//!
//! // Reopen it later
//! let tree = BTree::open("numbers.tree").unwrap();
//! assert!(tree.contains(42).unwrap());
//! ```

pub mod common;
pub mod index;
pub mod storage;

// Re-export commonly used items at crate root for convenience
pub use common::config::{DEFAULT_ORDER, MAX_PAGE_SIZE, MIN_ORDER};
pub use common::{Error, NodeRef, Result};

pub use index::btree::{BTree, Cursor, Iter, Node};
pub use storage::{IoStats, IoStatsSnapshot, PagedStore};
