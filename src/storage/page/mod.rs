//! Page types and layout.
//!
//! This module contains:
//! - [`Page`] - A raw page-sized data container
//! - [`FileHeader`] - Metadata at the start of every tree file

mod file_header;
#[allow(clippy::module_inception)]
mod page;

pub use file_header::FileHeader;
pub use page::Page;
