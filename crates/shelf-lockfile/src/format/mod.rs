//! Lockfile format
//!
//! ```text
//! {
//!   "format": 1,
//!   "fingerprint": "<blake3 of the normalized roots>",
//!   "entries": [
//!     { "name": "apt", "version": "7.4.0", "source": { "type": "site", "url": "..." } }
//!   ]
//! }
//! ```
//!
//! Entries keep the order the resolver produced. Credentials are stripped
//! from sources before they are written.

use camino::Utf8Path;
use serde::{Deserialize, Serialize};
use shelf_core::error::ShelfError;
use shelf_core::types::{Dependency, LocationSpec, PackageIdentity, Version};
use std::io::Write;
use tracing::debug;

use crate::fingerprint::fingerprint;
use crate::LockfileResult;

/// Current format version
pub const LOCKFILE_FORMAT: u32 = 1;

/// Conventional file name next to the manifest
pub const LOCKFILE_NAME: &str = "Shelf.lock";

/// One resolved cookbook
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockEntry {
    pub name: String,
    pub version: Version,
    pub source: LocationSpec,
}

impl LockEntry {
    pub fn new(name: impl Into<String>, version: Version, source: &LocationSpec) -> Self {
        Self {
            name: name.into(),
            version,
            source: source.redacted(),
        }
    }

    pub fn identity(&self) -> PackageIdentity {
        PackageIdentity::new(self.name.clone(), self.version.clone())
    }
}

/// A persisted resolution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lockfile {
    pub format: u32,
    pub fingerprint: String,
    pub entries: Vec<LockEntry>,
}

impl Lockfile {
    /// Lock `entries` as the resolution of `roots`
    pub fn new(roots: &[Dependency], entries: Vec<LockEntry>) -> Self {
        Self::from_parts(fingerprint(roots), entries)
    }

    pub fn from_parts(fingerprint: String, entries: Vec<LockEntry>) -> Self {
        Self {
            format: LOCKFILE_FORMAT,
            fingerprint,
            entries: entries
                .into_iter()
                .map(|entry| LockEntry {
                    source: entry.source.redacted(),
                    ..entry
                })
                .collect(),
        }
    }

    /// Serialize to the on-disk text form
    pub fn write(&self) -> LockfileResult<String> {
        let mut text = serde_json::to_string_pretty(self).map_err(|e| ShelfError::LockfileParse {
            message: format!("serialization failed: {}", e),
        })?;
        text.push('\n');
        Ok(text)
    }

    /// Parse the on-disk text form
    pub fn read(text: &str) -> LockfileResult<Self> {
        let value: serde_json::Value = serde_json::from_str(text).map_err(|e| ShelfError::LockfileParse {
            message: e.to_string(),
        })?;

        match value.get("format").and_then(serde_json::Value::as_u64) {
            Some(format) if format == u64::from(LOCKFILE_FORMAT) => {},
            Some(format) => {
                return Err(ShelfError::LockfileParse {
                    message: format!("unsupported lockfile format {}", format),
                })
            },
            None => {
                return Err(ShelfError::LockfileParse {
                    message: "missing format version".to_string(),
                })
            },
        }

        serde_json::from_value(value).map_err(|e| ShelfError::LockfileParse { message: e.to_string() })
    }

    /// Whether this lockfile was produced from exactly these roots
    pub fn is_fresh(&self, roots: &[Dependency]) -> bool {
        self.fingerprint == fingerprint(roots)
    }

    pub fn find(&self, name: &str) -> Option<&LockEntry> {
        self.entries.iter().find(|entry| entry.name == name)
    }

    /// Read a lockfile, None when the file does not exist
    pub fn load(path: &Utf8Path) -> LockfileResult<Option<Self>> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(ShelfError::io(format!("Failed to read lockfile {}", path), e)),
        };

        Self::read(&text).map(Some).map_err(|e| match e {
            ShelfError::LockfileParse { message } => ShelfError::LockfileParse {
                message: format!("{}: {}", path, message),
            },
            other => other,
        })
    }

    /// Write atomically: a sibling temporary file renamed over `path`
    pub fn save(&self, path: &Utf8Path) -> LockfileResult<()> {
        let text = self.write()?;
        let dir = match path.parent() {
            Some(parent) if !parent.as_str().is_empty() => parent,
            _ => Utf8Path::new("."),
        };

        let mut temp = tempfile::Builder::new()
            .prefix(".shelf-lock")
            .tempfile_in(dir)
            .map_err(|e| ShelfError::io(format!("Failed to create temporary lockfile in {}", dir), e))?;
        temp.write_all(text.as_bytes())
            .map_err(|e| ShelfError::io(format!("Failed to write temporary lockfile in {}", dir), e))?;
        temp.persist(path)
            .map_err(|e| ShelfError::io(format!("Failed to replace lockfile {}", path), e.error))?;

        debug!(path = %path, entries = self.entries.len(), "saved lockfile");
        Ok(())
    }
}
