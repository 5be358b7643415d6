//! Cookbooks in a local directory

use async_trait::async_trait;
use camino::Utf8PathBuf;
use shelf_core::error::ShelfError;
use shelf_core::types::{CachedPackage, CookbookMetadata, LocationSpec, Version};
use shelf_core::utils::blake3_fields;
use shelf_store::CookbookStore;
use std::sync::Arc;
use std::time::UNIX_EPOCH;
use tracing::{debug, instrument};
use walkdir::WalkDir;

use super::Location;
use crate::context::ShelfContext;
use crate::LocationResult;

/// A cookbook checked out on disk
#[derive(Debug)]
pub struct PathLocation {
    spec: LocationSpec,
    dir: Utf8PathBuf,
    store: Arc<CookbookStore>,
}

impl PathLocation {
    pub fn new(spec: LocationSpec, ctx: &ShelfContext) -> Self {
        let dir = match &spec {
            LocationSpec::Path { path } => path.clone(),
            _ => Utf8PathBuf::new(),
        };
        Self {
            spec,
            dir,
            store: ctx.store.clone(),
        }
    }

    /// Metadata of the cookbook in the directory, which must be `name`
    fn metadata(&self, name: &str, requested: &str) -> LocationResult<CookbookMetadata> {
        if !self.dir.is_dir() || CookbookMetadata::locate(&self.dir).is_none() {
            return Err(ShelfError::not_found(name, requested, self.spec.descriptor()));
        }

        let metadata = CookbookMetadata::from_dir(&self.dir)?;
        if metadata.name != name {
            debug!(expected = name, found = %metadata.name, dir = %self.dir, "directory holds another cookbook");
            return Err(ShelfError::not_found(name, requested, self.spec.descriptor()));
        }
        Ok(metadata)
    }

    /// Digest of the file listing: relative path, size and modification time
    fn tree_revision(&self) -> LocationResult<String> {
        let mut fields = Vec::new();

        let walker = WalkDir::new(&self.dir)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| !matches!(entry.file_name().to_str(), Some(".git" | ".svn" | ".hg")));

        for entry in walker {
            let entry = entry.map_err(|e| ShelfError::SourceUnavailable {
                location: self.spec.descriptor(),
                message: "failed to scan directory".to_string(),
                source: Some(Box::new(e)),
            })?;
            if !entry.file_type().is_file() {
                continue;
            }

            let relative = entry.path().strip_prefix(&self.dir).unwrap_or(entry.path());
            let meta = entry
                .metadata()
                .map_err(|e| ShelfError::unavailable(self.spec.descriptor(), e.to_string()))?;
            let mtime = meta
                .modified()
                .ok()
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map(|d| d.as_nanos())
                .unwrap_or_default();

            fields.push(relative.to_string_lossy().into_owned());
            fields.push(format!("{}:{}", meta.len(), mtime));
        }

        Ok(blake3_fields(fields))
    }
}

#[async_trait]
impl Location for PathLocation {
    fn spec(&self) -> &LocationSpec {
        &self.spec
    }

    async fn available_versions(&self, name: &str) -> LocationResult<Vec<Version>> {
        let metadata = self.metadata(name, "any")?;
        Ok(vec![metadata.version])
    }

    #[instrument(skip(self), fields(location = %self.spec))]
    async fn fetch(&self, name: &str, version: &Version) -> LocationResult<CachedPackage> {
        let metadata = self.metadata(name, &version.to_string())?;
        if &metadata.version != version {
            return Err(ShelfError::not_found(name, version.to_string(), self.spec.descriptor()));
        }

        let revision = self.tree_revision()?;
        let package = CachedPackage::new(self.dir.clone(), metadata).with_revision(Some(revision));
        self.store.supersede(package)
    }

    async fn cache_key(&self) -> LocationResult<String> {
        if !self.dir.is_dir() {
            return Ok(self.spec.descriptor());
        }
        Ok(format!("{}@{}", self.spec.descriptor(), self.tree_revision()?))
    }
}
