//! Page - the fixed-size unit of tree I/O.
//!
//! A [`Page`] is a raw byte buffer of the tree file's page size. Unlike a
//! database with one global page size, every tree file picks its own page
//! size from its `order`, so the buffer is sized at runtime.

/// A page of data.
///
/// This is the unit of I/O between the tree file and memory: nodes are
/// encoded into a page before writing and decoded from one after reading.
///
/// # Clone Implementation
/// `Page` does NOT implement `Clone` in production code, copying a page
/// should be explicit. A `#[cfg(test)]` Clone is provided for tests.
///
/// # Example
/// ```
/// use pagetree::storage::page::Page;
///
/// let mut page = Page::new(73);
/// page.as_mut_slice()[0] = 0xFF;
/// assert_eq!(page.as_slice()[0], 0xFF);
/// assert_eq!(page.size(), 73);
/// ```
pub struct Page {
    data: Box<[u8]>,
}

impl Page {
    /// Create a new zeroed page of `size` bytes.
    #[inline]
    pub fn new(size: usize) -> Self {
        Self {
            data: vec![0u8; size].into_boxed_slice(),
        }
    }

    /// Get immutable slice of page data.
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Get mutable slice of page data.
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Zero out the entire page.
    pub fn reset(&mut self) {
        self.data.fill(0);
    }

    /// Get the size of this page.
    #[inline]
    pub fn size(&self) -> usize {
        self.data.len()
    }
}

// Clone only available in tests - forces explicit copying in production
#[cfg(test)]
impl Clone for Page {
    fn clone(&self) -> Self {
        let mut new_page = Page::new(self.size());
        new_page.data.copy_from_slice(&self.data);
        new_page
    }
}

// ============================================================================
// TESTS
// ============================================================================
