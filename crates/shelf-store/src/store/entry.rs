//! Store entry records
//!
//! Each store entry carries a small JSON record naming its identity, when it
//! was stored and the revision stamp of the location that produced it. An
//! entry directory without a record is incomplete and is ignored.

use camino::Utf8Path;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shelf_core::error::ShelfError;
use shelf_core::types::{PackageIdentity, Version};
use std::fs;

use crate::StoreResult;

/// File name of the record inside each entry directory
pub const ENTRY_RECORD: &str = ".shelf-entry.json";

/// Persistent record describing one store entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryRecord {
    pub name: String,
    pub version: Version,
    pub stored_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,
}

impl EntryRecord {
    /// Create a record stamped with the current time
    pub fn new(identity: &PackageIdentity, revision: Option<String>) -> Self {
        Self {
            name: identity.name.clone(),
            version: identity.version.clone(),
            stored_at: Utc::now(),
            revision,
        }
    }

    pub fn identity(&self) -> PackageIdentity {
        PackageIdentity::new(self.name.clone(), self.version.clone())
    }

    /// Age of the entry in seconds
    pub fn age_seconds(&self) -> i64 {
        (Utc::now() - self.stored_at).num_seconds()
    }

    /// Read the record from an entry directory, None when absent
    pub fn read(dir: &Utf8Path) -> StoreResult<Option<Self>> {
        let path = dir.join(ENTRY_RECORD);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(ShelfError::io(format!("Failed to read {}", path), e)),
        };

        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| ShelfError::MetadataParse {
                path: path.to_string(),
                message: e.to_string(),
            })
    }

    /// Write the record into an entry directory
    pub fn write(&self, dir: &Utf8Path) -> StoreResult<()> {
        let path = dir.join(ENTRY_RECORD);
        let content = serde_json::to_string_pretty(self).map_err(|e| ShelfError::MetadataParse {
            path: path.to_string(),
            message: e.to_string(),
        })?;
        fs::write(&path, content).map_err(|e| ShelfError::io(format!("Failed to write {}", path), e))
    }
}
