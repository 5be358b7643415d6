//! Cookbook dependency resolution for Shelf
//!
//! Resolves a list of root dependencies into one version per cookbook using
//! a backtracking search over the versions each location offers, and turns
//! the result into lockfile entries. Installation reuses a lockfile when it
//! still matches the roots.

pub mod candidates;
pub mod fetch;
pub mod graph;
pub mod install;
pub mod solver;

#[cfg(test)]
mod test_support;

// Re-export main types
pub use candidates::{order_versions, CandidateQueue};
pub use fetch::Fetcher;
pub use graph::{ResolutionGraph, ResolvedCookbook};
pub use install::Installation;
pub use solver::{Resolution, ResolutionStats, Resolver, ResolverOptions};
pub use tokio_util::sync::CancellationToken;

use shelf_core::error::ShelfError;

/// Result type for resolver operations
pub type ResolverResult<T> = Result<T, ShelfError>;
