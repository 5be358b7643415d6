//! # shelf-core
//!
//! Core types and utilities shared across all Shelf crates.
//!
//! This crate provides:
//! - Version, Constraint and ConstraintSet types for cookbook versioning
//! - Dependency, LocationSpec and CookbookMetadata types
//! - ShelfError enum for unified error handling
//! - Utility functions for hashing and safe paths
//!
//! ## Architecture
//!
//! The crate is organized into modules:
//! - `types`: Core data types (Version, Constraint, CachedPackage, etc.)
//! - `error`: Error types and result aliases
//! - `utils`: Utility functions and helpers

pub mod error;
pub mod types;
pub mod utils;

// Re-export commonly used types
pub use error::{ShelfError, ShelfResult};
pub use types::{
    CachedPackage, Constraint, ConstraintSet, CookbookMetadata, Demand, Dependency, Dependent, FailureReport,
    GitRef, LocationSpec, PackageIdentity, UnsatisfiableConstraint, Version,
};
