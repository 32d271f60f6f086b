//! Paged Store - page-level file I/O for B-tree nodes.
//!
//! The [`PagedStore`] handles all direct file operations:
//! - Reading and writing node pages by reference
//! - Allocating new pages by appending to the file
//! - Persisting the file header

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;

use crate::common::config::{self, ENTRY_LEN, MAX_PAGE_SIZE, MIN_ORDER, NODE_PREFIX_LEN};
use crate::common::{Error, NodeRef, Result};
use crate::index::btree::Node;
use crate::storage::page::{FileHeader, Page};
use crate::storage::stats::IoStats;

/// Owns the tree file and moves node pages in and out of it.
///
/// # File Layout
/// ```text
/// ┌──────────┬──────────┬──────────┬─────────┬────────────┐
/// │ Header   │ Page 0   │ Page 1   │  ...    │ Page N-1   │
/// │ (32 B)   │ (P B)    │ (P B)    │         │ (P B)      │
/// └──────────┴──────────┴──────────┴─────────┴────────────┘
/// Offset:  0         32       32+P     ...    32+(N-1)×P
/// ```
///
/// A node's reference is the offset of its page. The page size `P` is the
/// worst-case encoded node size for the tree's order.
///
/// # Exclusivity
/// The file is locked with an exclusive advisory lock for the lifetime of
/// the store; a second handle on the same file fails to open.
///
/// # Durability
/// Page writes are not synced individually. The header is rewritten when
/// the owner calls [`flush_header`](Self::flush_header) and unconditionally
/// when the store is closed or dropped. Multi-page updates are not atomic.
///
/// # Space
/// Allocation only ever appends. Pages of nodes emptied by merges are never
/// reused and the file never shrinks.
pub struct PagedStore {
    file: File,
    path: PathBuf,
    header: FileHeader,
    order: usize,
    stats: IoStats,
    /// Set once the header has been flushed by `close`.
    closed: bool,
}

impl PagedStore {
    /// Length of the file header in bytes.
    pub const HEADER_LEN: usize = FileHeader::SIZE;

    /// Create a new tree file paged for `order`.
    ///
    /// An existing file at `path` is truncated. The header is not written
    /// here; the owner flushes it once the root node exists.
    ///
    /// # Errors
    /// - `Error::InvalidOrder` if `order` needs pages over 32KB
    /// - `Error::FileLocked` if another handle holds the file
    pub fn create<P: AsRef<Path>>(path: P, order: usize) -> Result<Self> {
        let path = path.as_ref();
        let page_size = config::page_size_for(order)?;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        lock_exclusive(&file, path)?;
        // Only truncate once the lock is ours.
        file.set_len(0)?;

        tracing::info!(path = %path.display(), order, page_size, "created tree file");

        Ok(Self {
            file,
            path: path.to_path_buf(),
            header: FileHeader::new(page_size as u32),
            order,
            stats: IoStats::new(),
            closed: false,
        })
    }

    /// Open an existing tree file and read its header.
    ///
    /// # Errors
    /// - `Error::FileNotFound` if the file doesn't exist
    /// - `Error::FileLocked` if another handle holds the file
    /// - `Error::Corrupt` if the header does not describe this file
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::FileNotFound(path.to_path_buf()));
        }

        let file = OpenOptions::new().read(true).write(true).open(path)?;
        lock_exclusive(&file, path)?;

        let mut bytes = [0u8; FileHeader::SIZE];
        let n = read_full(&file, 0, &mut bytes)?;
        if n != FileHeader::SIZE {
            return Err(Error::ShortIo {
                operation: "header read",
                reference: NodeRef::NULL,
                expected: FileHeader::SIZE,
                actual: n,
            });
        }
        let header = FileHeader::from_bytes(&bytes);
        let order = validate_header(&header, file.metadata()?.len())?;

        tracing::info!(
            path = %path.display(),
            order,
            pages = header.pages_allocated,
            size = header.tree_size,
            "opened tree file"
        );

        Ok(Self {
            file,
            path: path.to_path_buf(),
            header,
            order,
            stats: IoStats::new(),
            closed: false,
        })
    }

    /// Read and decode the node at `reference`.
    ///
    /// # Errors
    /// - `Error::InvalidReference` unless `reference` starts an allocated page
    /// - `Error::ShortIo` if less than a full page could be read
    /// - `Error::Corrupt` if the page does not hold the node it should
    pub fn read_node(&self, reference: NodeRef) -> Result<Node> {
        if !self.header.is_valid_reference(reference) {
            return Err(Error::InvalidReference(reference));
        }

        let mut page = Page::new(self.page_size());
        let n = read_full(&self.file, reference.offset(), page.as_mut_slice())?;
        if n != page.size() {
            return Err(Error::ShortIo {
                operation: "read",
                reference,
                expected: page.size(),
                actual: n,
            });
        }
        self.stats.record_read();

        let node = Node::decode(page.as_slice())?;
        if node.reference() != reference {
            return Err(Error::Corrupt {
                reference,
                reason: format!("page belongs to {}", node.reference()),
            });
        }
        Ok(node)
    }

    /// Encode `node` and write it over its page.
    ///
    /// # Errors
    /// - `Error::InvalidReference` if the node's page was never allocated
    /// - `Error::ShortIo` if less than a full page could be written
    pub fn write_node(&mut self, node: &Node) -> Result<()> {
        let reference = node.reference();
        if !self.header.is_valid_reference(reference) {
            return Err(Error::InvalidReference(reference));
        }

        let mut page = Page::new(self.page_size());
        node.encode(page.as_mut_slice())?;

        let n = write_full(&self.file, reference.offset(), page.as_slice())?;
        if n != page.size() {
            return Err(Error::ShortIo {
                operation: "write",
                reference,
                expected: page.size(),
                actual: n,
            });
        }
        self.stats.record_write();
        Ok(())
    }

    /// Append a zero-filled page and return an empty node bound to it.
    ///
    /// The returned node only exists in memory until it is written.
    pub fn allocate(&mut self, is_leaf: bool) -> Result<Node> {
        let reference = NodeRef::new(self.header.page_offset(self.header.pages_allocated));
        let page = Page::new(self.page_size());

        let n = write_full(&self.file, reference.offset(), page.as_slice())?;
        if n != page.size() {
            return Err(Error::ShortIo {
                operation: "allocate",
                reference,
                expected: page.size(),
                actual: n,
            });
        }

        self.header.pages_allocated += 1;
        self.stats.record_allocation();
        tracing::debug!(%reference, is_leaf, "allocated page");

        Ok(Node::new(self.order, reference, is_leaf))
    }

    /// Write the in-memory header to the start of the file.
    pub fn flush_header(&mut self) -> Result<()> {
        let bytes = self.header.to_bytes();
        let n = write_full(&self.file, 0, &bytes)?;
        if n != bytes.len() {
            return Err(Error::ShortIo {
                operation: "header write",
                reference: NodeRef::NULL,
                expected: bytes.len(),
                actual: n,
            });
        }
        self.stats.record_header_write();
        Ok(())
    }

    /// Flush the header, sync the file and release it.
    ///
    /// The file handle is released even when the flush fails.
    pub fn close(mut self) -> Result<()> {
        let result = self
            .flush_header()
            .and_then(|()| self.file.sync_all().map_err(Error::from));
        self.closed = true;
        tracing::info!(path = %self.path.display(), ok = result.is_ok(), "closed tree file");
        result
    }

    // ========================================================================
    // Header accessors
    // ========================================================================

    #[inline]
    pub fn order(&self) -> usize {
        self.order
    }

    #[inline]
    pub fn root(&self) -> NodeRef {
        self.header.root
    }

    #[inline]
    pub fn set_root(&mut self, root: NodeRef) {
        self.header.root = root;
    }

    #[inline]
    pub fn tree_size(&self) -> u64 {
        self.header.tree_size
    }

    #[inline]
    pub fn set_tree_size(&mut self, size: u64) {
        self.header.tree_size = size;
    }

    /// Tree height; validated as non-negative when the file was opened.
    #[inline]
    pub fn tree_height(&self) -> usize {
        self.header.tree_height.max(0) as usize
    }

    #[inline]
    pub fn set_tree_height(&mut self, height: usize) {
        self.header.tree_height = height as i32;
    }

    #[inline]
    pub fn page_size(&self) -> usize {
        self.header.page_size as usize
    }

    #[inline]
    pub fn header_len(&self) -> usize {
        Self::HEADER_LEN
    }

    #[inline]
    pub fn pages_allocated(&self) -> u64 {
        self.header.pages_allocated
    }

    /// Get the total size of the paged region in bytes.
    #[inline]
    pub fn file_size(&self) -> u64 {
        self.header.page_offset(self.header.pages_allocated)
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[inline]
    pub fn stats(&self) -> &IoStats {
        &self.stats
    }
}

impl Drop for PagedStore {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        // Teardown must release the handle, so a failed flush is only logged.
        if let Err(e) = self.flush_header() {
            tracing::error!(path = %self.path.display(), error = %e, "failed to write tree header on close");
        }
    }
}

fn lock_exclusive(file: &File, path: &Path) -> Result<()> {
    file.try_lock_exclusive().map_err(|e| {
        if e.raw_os_error() == fs2::lock_contended_error().raw_os_error() {
            Error::FileLocked(path.to_path_buf())
        } else {
            Error::Io(e)
        }
    })
}

/// Check a header read from disk and derive the tree order from it.
fn validate_header(header: &FileHeader, file_len: u64) -> Result<usize> {
    let corrupt = |reason: String| Error::Corrupt {
        reference: NodeRef::NULL,
        reason,
    };

    let page_size = header.page_size as usize;
    if page_size < config::max_encoded_size(MIN_ORDER)
        || page_size > MAX_PAGE_SIZE
        || (page_size - NODE_PREFIX_LEN) % ENTRY_LEN != 0
    {
        return Err(corrupt(format!("unsupported page size {page_size}")));
    }
    let order = (page_size - NODE_PREFIX_LEN) / ENTRY_LEN - 1;

    if header.tree_height < 0 {
        return Err(corrupt(format!("negative tree height {}", header.tree_height)));
    }
    if !header.is_valid_reference(header.root) {
        return Err(corrupt(format!("root {} is not an allocated page", header.root)));
    }

    let expected_len = header
        .pages_allocated
        .checked_mul(u64::from(header.page_size))
        .and_then(|n| n.checked_add(FileHeader::SIZE as u64))
        .ok_or_else(|| corrupt(format!("{} pages overflow", header.pages_allocated)))?;
    if file_len < expected_len {
        return Err(corrupt(format!(
            "file is {file_len} bytes, header needs {expected_len}"
        )));
    }

    Ok(order)
}

/// Read into `buf` from `offset` until it is full or the file ends.
fn read_full(mut file: &File, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
    file.seek(SeekFrom::Start(offset))?;
    let mut filled = 0;
    while filled < buf.len() {
        match file.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Write `buf` at `offset`, stopping early only if the file accepts nothing.
fn write_full(mut file: &File, offset: u64, buf: &[u8]) -> io::Result<usize> {
    file.seek(SeekFrom::Start(offset))?;
    let mut written = 0;
    while written < buf.len() {
        match file.write(&buf[written..]) {
            Ok(0) => break,
            Ok(n) => written += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(written)
}
