//! Cookbook sources for Shelf
//!
//! This crate provides the [`Location`] capability shared by every place a
//! cookbook can come from (a local directory, a git repository, a community
//! site or a private Chef server), the HTTP client those adapters share, and
//! the explicit [`ShelfContext`] they are built from.

pub mod context;
pub mod http;
pub mod location;

// Re-export main types
pub use context::{DefaultLocationProvider, LocationProvider, ShelfContext};
pub use http::{with_retry, HttpClient, RetryConfig};
pub use location::{
    revision_from_key, AnyLocation, ChefServerLocation, FixedLocationProvider, GitLocation, Location,
    MemoryLocation, PathLocation, SiteLocation,
};

use shelf_core::error::ShelfError;

/// Result type for location operations
pub type LocationResult<T> = Result<T, ShelfError>;
