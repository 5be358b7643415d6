//! Configuration for the Shelf cookbook dependency manager
//!
//! This crate loads `config.toml` from the Shelf home directory, layers
//! environment overrides on top and validates the result.

pub mod merge;
pub mod toml;

// Re-export main types
pub use self::merge::{ConfigLayering, ConfigLoader, ConfigSource};
pub use self::toml::{ChefServerSection, GitSection, NetworkSection, ResolverSection, ShelfConfig, SiteSection};

use shelf_core::error::ShelfError;

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ShelfError>;
