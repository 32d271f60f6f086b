//! File header stored at offset 0 of every tree file.
//!
//! The [`FileHeader`] records how the file is paged and where the tree
//! lives:
//! - page size and number of pages allocated
//! - root reference, element count and height of the tree

use crate::common::NodeRef;

/// Metadata stored at the beginning of the tree file.
///
/// # Layout (32 bytes)
/// ```text
/// Offset  Size  Field
/// ------  ----  -----
/// 0       4     page_size (u32)
/// 4       8     pages_allocated (u64)
/// 12      8     root (u64)
/// 20      8     tree_size (u64)
/// 28      4     tree_height (i32)
/// ```
/// All fields are little-endian and packed. Page 0 starts right after the
/// header, which is why reference `0` can never name a node.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FileHeader {
    /// Size of every page in bytes.
    pub page_size: u32,
    /// Number of pages appended so far.
    pub pages_allocated: u64,
    /// Reference of the root node.
    pub root: NodeRef,
    /// Number of keys in the tree.
    pub tree_size: u64,
    /// Height of the tree (0 when the root is a leaf).
    pub tree_height: i32,
}

impl FileHeader {
    /// Size of the header in bytes.
    pub const SIZE: usize = 32;

    /// Offset of each field within the header.
    pub const OFFSET_PAGE_SIZE: usize = 0;
    pub const OFFSET_PAGES_ALLOCATED: usize = 4;
    pub const OFFSET_ROOT: usize = 12;
    pub const OFFSET_TREE_SIZE: usize = 20;
    pub const OFFSET_TREE_HEIGHT: usize = 28;

    /// Create a header for an empty file with the given page size.
    pub fn new(page_size: u32) -> Self {
        Self {
            page_size,
            ..Self::default()
        }
    }

    /// Read a header from its on-disk bytes.
    pub fn from_bytes(data: &[u8; Self::SIZE]) -> Self {
        let page_size = u32::from_le_bytes([
            data[Self::OFFSET_PAGE_SIZE],
            data[Self::OFFSET_PAGE_SIZE + 1],
            data[Self::OFFSET_PAGE_SIZE + 2],
            data[Self::OFFSET_PAGE_SIZE + 3],
        ]);
        let pages_allocated = read_u64(data, Self::OFFSET_PAGES_ALLOCATED);
        let root = NodeRef(read_u64(data, Self::OFFSET_ROOT));
        let tree_size = read_u64(data, Self::OFFSET_TREE_SIZE);
        let tree_height = i32::from_le_bytes([
            data[Self::OFFSET_TREE_HEIGHT],
            data[Self::OFFSET_TREE_HEIGHT + 1],
            data[Self::OFFSET_TREE_HEIGHT + 2],
            data[Self::OFFSET_TREE_HEIGHT + 3],
        ]);

        Self {
            page_size,
            pages_allocated,
            root,
            tree_size,
            tree_height,
        }
    }

    /// Encode this header into its on-disk bytes.
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut data = [0u8; Self::SIZE];
        data[Self::OFFSET_PAGE_SIZE..Self::OFFSET_PAGE_SIZE + 4]
            .copy_from_slice(&self.page_size.to_le_bytes());
        data[Self::OFFSET_PAGES_ALLOCATED..Self::OFFSET_PAGES_ALLOCATED + 8]
            .copy_from_slice(&self.pages_allocated.to_le_bytes());
        data[Self::OFFSET_ROOT..Self::OFFSET_ROOT + 8].copy_from_slice(&self.root.0.to_le_bytes());
        data[Self::OFFSET_TREE_SIZE..Self::OFFSET_TREE_SIZE + 8]
            .copy_from_slice(&self.tree_size.to_le_bytes());
        data[Self::OFFSET_TREE_HEIGHT..Self::OFFSET_TREE_HEIGHT + 4]
            .copy_from_slice(&self.tree_height.to_le_bytes());
        data
    }

    /// Byte offset of the page with the given index.
    #[inline]
    pub fn page_offset(&self, index: u64) -> u64 {
        Self::SIZE as u64 + index * u64::from(self.page_size)
    }

    /// Whether `reference` is the start of an allocated page.
    pub fn is_valid_reference(&self, reference: NodeRef) -> bool {
        let header_len = Self::SIZE as u64;
        let page_size = u64::from(self.page_size);
        if page_size == 0 || reference.0 < header_len {
            return false;
        }
        let rel = reference.0 - header_len;
        rel % page_size == 0 && rel / page_size < self.pages_allocated
    }
}

fn read_u64(data: &[u8; FileHeader::SIZE], offset: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&data[offset..offset + 8]);
    u64::from_le_bytes(bytes)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_header_new() {
        let header = FileHeader::new(73);
        assert_eq!(header.page_size, 73);
        assert_eq!(header.pages_allocated, 0);
        assert!(header.root.is_null());
        assert_eq!(header.tree_size, 0);
        assert_eq!(header.tree_height, 0);
    }

    #[test]
    fn test_file_header_roundtrip() {
        let original = FileHeader {
            page_size: 1237,
            pages_allocated: 0x0102_0304_0506_0708,
            root: NodeRef::new(32 + 1237 * 5),
            tree_size: 100_000,
            tree_height: 2,
        };

        let recovered = FileHeader::from_bytes(&original.to_bytes());
        assert_eq!(original, recovered);
    }

    #[test]
    fn test_file_header_byte_layout() {
        let header = FileHeader {
            page_size: 0x0403_0201,
            pages_allocated: 0x11,
            root: NodeRef::new(0x22),
            tree_size: 0x33,
            tree_height: -1,
        };

        let buffer = header.to_bytes();

        assert_eq!(&buffer[0..4], &[0x01, 0x02, 0x03, 0x04]);
        assert_eq!(buffer[4], 0x11);
        assert_eq!(buffer[12], 0x22);
        assert_eq!(buffer[20], 0x33);
        assert_eq!(&buffer[28..32], &[0xFF, 0xFF, 0xFF, 0xFF]);
    }

    #[test]
    fn test_reference_validity() {
        let mut header = FileHeader::new(100);
        header.pages_allocated = 3;

        assert!(!header.is_valid_reference(NodeRef::NULL));
        assert!(!header.is_valid_reference(NodeRef::new(31)));
        assert!(header.is_valid_reference(NodeRef::new(32)));
        assert!(header.is_valid_reference(NodeRef::new(132)));
        assert!(header.is_valid_reference(NodeRef::new(232)));
        assert!(!header.is_valid_reference(NodeRef::new(332))); // not allocated
        assert!(!header.is_valid_reference(NodeRef::new(133))); // not aligned
    }

    #[test]
    fn test_page_offset() {
        let header = FileHeader::new(61);
        assert_eq!(header.page_offset(0), 32);
        assert_eq!(header.page_offset(2), 32 + 122);
    }
}
