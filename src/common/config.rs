//! Configuration constants for pagetree.
//!
//! The only runtime knob is the tree `order`. Everything else about the
//! on-disk format follows from it: the page size is the worst-case encoded
//! size of a node holding `order + 1` keys.

use crate::common::{Error, Result};

/// Largest page size a tree file may use (32KB).
///
/// A tree whose `order` would need bigger pages is rejected at creation.
pub const MAX_PAGE_SIZE: usize = 32 * 1024;

/// Smallest accepted `order`.
///
/// With `order < 2` the minimum fill of a non-root node (`order / 2`) is
/// zero and empty nodes would be legal.
pub const MIN_ORDER: usize = 2;

/// Order used by callers that have no preference.
pub const DEFAULT_ORDER: usize = 100;

/// Size of the fixed node prefix in bytes.
///
/// ```text
/// order(4) + key_count(4) + reference(8) + is_leaf(1) + sentinel(8) = 25
/// ```
pub const NODE_PREFIX_LEN: usize = 4 + 4 + 8 + 1 + 8;

/// Size of one encoded `(key: i32, value: u64)` entry.
pub const ENTRY_LEN: usize = 4 + 8;

/// Worst-case encoded size of a node for the given `order`.
///
/// A node may briefly hold `order + 1` keys before it is split, so the
/// page has to fit that many entries.
#[inline]
pub const fn max_encoded_size(order: usize) -> usize {
    NODE_PREFIX_LEN + (order + 1) * ENTRY_LEN
}

/// Page size for a tree of the given `order`.
///
/// # Errors
/// Returns `Error::InvalidOrder` if `order` is below [`MIN_ORDER`] or the
/// page would be larger than [`MAX_PAGE_SIZE`].
pub fn page_size_for(order: usize) -> Result<usize> {
    if order < MIN_ORDER {
        return Err(Error::InvalidOrder {
            order,
            reason: format!("order must be at least {MIN_ORDER}"),
        });
    }
    let page_size = order
        .checked_add(1)
        .and_then(|n| n.checked_mul(ENTRY_LEN))
        .and_then(|n| n.checked_add(NODE_PREFIX_LEN))
        .filter(|&n| n <= MAX_PAGE_SIZE);
    page_size.ok_or_else(|| Error::InvalidOrder {
        order,
        reason: format!("page size would exceed {MAX_PAGE_SIZE} bytes"),
    })
}
