//! Core data types for Shelf cookbook management.
//!
//! This module provides the fundamental types used throughout the Shelf crates:
//! - Version and constraint types
//! - Dependency and location descriptors
//! - Cookbook metadata and cached cookbook records
//! - Failure diagnostics

pub mod constraint;
pub mod dependency;
pub mod location;
pub mod metadata;
pub mod package;
pub mod report;
pub mod version;

// Re-export all public types
pub use constraint::{Constraint, ConstraintError, ConstraintSet, Op};
pub use dependency::Dependency;
pub use location::{GitRef, LocationSpec};
pub use metadata::{CookbookMetadata, METADATA_JSON, METADATA_RB};
pub use package::{CachedPackage, PackageIdentity};
pub use report::{Demand, Dependent, FailureReport, UnsatisfiableConstraint};
pub use version::{PartialVersion, Version, VersionError};
