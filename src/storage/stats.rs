//! Paged store I/O statistics.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// I/O counters tracked by the paged store.
///
/// Reads go through `&self`, so the counters are atomics rather than plain
/// integers.
///
/// # Memory Ordering
/// We use `Ordering::Relaxed` for all operations: the counters are
/// independent and only need atomic increments.
///
/// # Example
/// ```
/// use pagetree::IoStats;
/// use std::sync::atomic::Ordering;
///
/// let stats = IoStats::new();
/// stats.pages_read.fetch_add(1, Ordering::Relaxed);
/// assert_eq!(stats.snapshot().pages_read, 1);
/// ```
#[derive(Debug)]
pub struct IoStats {
    /// Number of node pages read from the file.
    pub pages_read: AtomicU64,

    /// Number of node pages written to the file.
    pub pages_written: AtomicU64,

    /// Number of pages appended to the file.
    pub pages_allocated: AtomicU64,

    /// Number of times the file header was written.
    pub header_writes: AtomicU64,
}

impl IoStats {
    /// Create a new stats tracker with all counters at zero.
    pub fn new() -> Self {
        Self {
            pages_read: AtomicU64::new(0),
            pages_written: AtomicU64::new(0),
            pages_allocated: AtomicU64::new(0),
            header_writes: AtomicU64::new(0),
        }
    }

    #[inline]
    pub(crate) fn record_read(&self) {
        self.pages_read.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_write(&self) {
        self.pages_written.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_allocation(&self) {
        self.pages_allocated.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_header_write(&self) {
        self.header_writes.fetch_add(1, Ordering::Relaxed);
    }

    /// Get a snapshot of current statistics.
    pub fn snapshot(&self) -> IoStatsSnapshot {
        IoStatsSnapshot {
            pages_read: self.pages_read.load(Ordering::Relaxed),
            pages_written: self.pages_written.load(Ordering::Relaxed),
            pages_allocated: self.pages_allocated.load(Ordering::Relaxed),
            header_writes: self.header_writes.load(Ordering::Relaxed),
        }
    }

    /// Reset all counters to zero.
    pub fn reset(&self) {
        self.pages_read.store(0, Ordering::Relaxed);
        self.pages_written.store(0, Ordering::Relaxed);
        self.pages_allocated.store(0, Ordering::Relaxed);
        self.header_writes.store(0, Ordering::Relaxed);
    }
}

impl Default for IoStats {
    fn default() -> Self {
        Self::new()
    }
}

/// A point-in-time copy of [`IoStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IoStatsSnapshot {
    pub pages_read: u64,
    pub pages_written: u64,
    pub pages_allocated: u64,
    pub header_writes: u64,
}

impl fmt::Display for IoStatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "IoStats {{ reads: {}, writes: {}, allocations: {}, header writes: {} }}",
            self.pages_read, self.pages_written, self.pages_allocated, self.header_writes
        )
    }
}
