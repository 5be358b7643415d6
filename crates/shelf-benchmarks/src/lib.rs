//! Shelf benchmarking suite
//!
//! Benchmarks for resolution, metadata and constraint parsing, and lockfile
//! handling.

pub mod common;

pub use common::*;
