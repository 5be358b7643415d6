//! Local cookbook store for Shelf
//!
//! This crate owns the directory tree of fetched cookbooks, addressed by
//! name and exact version. It also provides the archive and tree-linking
//! helpers locations use to populate staging directories.

pub mod archive;
pub mod link;
pub mod store;

// Re-export main types
pub use archive::{cookbook_root, create_archive, create_archive_bytes, extract_archive, extract_tar};
pub use link::{copy_tree, link_tree, LinkResult};
pub use store::{CookbookStore, EntryRecord, StagingDir, ENTRY_RECORD, STAGING_DIR};

use shelf_core::error::ShelfError;

/// Result type for store operations
pub type StoreResult<T> = Result<T, ShelfError>;
