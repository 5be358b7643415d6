//! Utility functions and helpers.
//!
//! Common functionality used across multiple Shelf crates.

pub mod hash;
pub mod path;

// Re-export commonly used utilities
pub use hash::{blake3_fields, blake3_hash};
pub use path::{is_safe_path, normalize_path, safe_join};
