//! Forward iteration over a [`BTree`].
//!
//! A [`Cursor`] remembers only the key it stands on. Every step asks the
//! tree for that key's successor, which is an independent root-to-leaf
//! descent.

use crate::common::{Error, Result};
use crate::index::btree::BTree;

/// A position in the ascending key sequence of a tree.
///
/// # Example
/// ```no_run
/// use pagetree::BTree;
///
/// let mut tree = BTree::create("cursor.tree", 4)?;
/// tree.put(2)?;
/// tree.put(1)?;
///
/// let mut cursor = tree.cursor()?;
/// assert_eq!(cursor.key()?, 1);
/// cursor.advance()?;
/// assert_eq!(cursor.key()?, 2);
/// cursor.advance()?;
/// assert!(cursor.is_end());
/// # Ok::<(), pagetree::Error>(())
/// ```
pub struct Cursor<'a> {
    tree: &'a BTree,
    key: i32,
    at_end: bool,
}

impl<'a> Cursor<'a> {
    pub(crate) fn at(tree: &'a BTree, key: i32) -> Self {
        Self {
            tree,
            key,
            at_end: false,
        }
    }

    pub(crate) fn end(tree: &'a BTree) -> Self {
        Self {
            tree,
            key: 0,
            at_end: true,
        }
    }

    /// Key under the cursor.
    ///
    /// # Errors
    /// Returns `Error::CursorExhausted` past the last key.
    pub fn key(&self) -> Result<i32> {
        if self.at_end {
            return Err(Error::CursorExhausted);
        }
        Ok(self.key)
    }

    /// Move to the next larger key, or to the end if there is none.
    ///
    /// # Errors
    /// Returns `Error::CursorExhausted` if the cursor is already at the end.
    pub fn advance(&mut self) -> Result<()> {
        if self.at_end {
            return Err(Error::CursorExhausted);
        }
        match self.tree.successor(self.key)? {
            Some(next) => self.key = next,
            None => self.at_end = true,
        }
        Ok(())
    }

    #[inline]
    pub fn is_end(&self) -> bool {
        self.at_end
    }
}

/// Iterator over the keys of a tree in ascending order.
///
/// Yields `Err` once if a page read fails and stops afterwards.
pub struct Iter<'a> {
    cursor: Cursor<'a>,
    started: bool,
    failed: bool,
}

impl<'a> Iter<'a> {
    pub(crate) fn new(cursor: Cursor<'a>) -> Self {
        Self {
            cursor,
            started: false,
            failed: false,
        }
    }
}

impl Iterator for Iter<'_> {
    type Item = Result<i32>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.cursor.is_end() {
            return None;
        }
        if self.started {
            if let Err(e) = self.cursor.advance() {
                self.failed = true;
                return Some(Err(e));
            }
            if self.cursor.is_end() {
                return None;
            }
        }
        self.started = true;
        Some(self.cursor.key())
    }
}
