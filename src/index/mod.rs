//! Index structures.
//!
//! - [`btree`] - Disk-backed B-tree set of `i32` keys

pub mod btree;
