//! Cookbook archive handling
//!
//! Community sites serve cookbooks as gzipped tarballs and `git archive`
//! produces plain tarballs; both are unpacked with the same traversal checks.

pub mod create;
pub mod extract;

pub use create::{create_archive, create_archive_bytes};
pub use extract::{cookbook_root, extract_archive, extract_tar};
