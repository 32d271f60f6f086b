//! Storage layer - file I/O and on-disk formats.
//!
//! This module handles persistent storage:
//! - [`PagedStore`] - Page-level file I/O and allocation
//! - [`page`] - Page buffer and file header layout
//! - [`IoStats`] - Page I/O counters

pub mod page;
mod paged_store;
mod stats;

pub use paged_store::PagedStore;
pub use stats::{IoStats, IoStatsSnapshot};
