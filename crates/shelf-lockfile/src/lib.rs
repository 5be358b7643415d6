//! Lockfile support for Shelf
//!
//! A lockfile records the exact version and origin of every cookbook chosen by
//! a resolution, plus a fingerprint of the root requirements that produced it.
//! When the fingerprint still matches the roots, the lockfile can be installed
//! directly without searching again.

pub mod fingerprint;
pub mod format;

pub use fingerprint::fingerprint;
pub use format::{LockEntry, Lockfile, LOCKFILE_FORMAT, LOCKFILE_NAME};

use shelf_core::error::ShelfError;

/// Result type for lockfile operations
pub type LockfileResult<T> = Result<T, ShelfError>;
