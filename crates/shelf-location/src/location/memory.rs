//! In-memory location
//!
//! Serves cookbooks described only by their metadata. Fetching one writes a
//! `metadata.json` into a staging directory and registers it with the store
//! exactly like a network source would, so code driving locations can be
//! exercised without network or subprocess I/O. Calls are counted.

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use shelf_core::error::ShelfError;
use shelf_core::types::{CachedPackage, CookbookMetadata, LocationSpec, PackageIdentity, Version, METADATA_JSON};
use shelf_store::CookbookStore;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use tracing::debug;

use super::{register, Location};
use crate::context::LocationProvider;
use crate::LocationResult;

/// A location whose catalogue lives in memory
#[derive(Debug)]
pub struct MemoryLocation {
    spec: LocationSpec,
    store: Arc<CookbookStore>,
    /// Versions per name, in declaration order
    catalogue: DashMap<String, Vec<CookbookMetadata>>,
    /// Stand-in for a moving ref; part of the cache key
    revision: RwLock<String>,
    /// Versions living at their own revision, like tags beside a branch
    pinned: DashMap<PackageIdentity, String>,
    fetches: DashMap<PackageIdentity, usize>,
    listings: AtomicUsize,
    broken: DashSet<PackageIdentity>,
    unavailable: DashSet<String>,
}

impl MemoryLocation {
    pub fn new(spec: LocationSpec, store: Arc<CookbookStore>) -> Self {
        Self {
            spec,
            store,
            catalogue: DashMap::new(),
            revision: RwLock::new("r0".to_string()),
            pinned: DashMap::new(),
            fetches: DashMap::new(),
            listings: AtomicUsize::new(0),
            broken: DashSet::new(),
            unavailable: DashSet::new(),
        }
    }

    /// Offer a cookbook version
    pub fn publish(&self, metadata: CookbookMetadata) -> &Self {
        let mut versions = self.catalogue.entry(metadata.name.clone()).or_default();
        versions.retain(|existing| existing.version != metadata.version);
        versions.push(metadata);
        self
    }

    /// Offer a version with no dependencies
    pub fn publish_bare(&self, name: &str, version: &str) -> LocationResult<&Self> {
        let version = version.parse::<Version>()?;
        Ok(self.publish(CookbookMetadata::new(name, version)))
    }

    /// Make every fetch of one identity fail with a transient error
    pub fn break_fetch(&self, name: &str, version: Version) {
        self.broken.insert(PackageIdentity::new(name, version));
    }

    /// Make listing a name fail with a transient error
    pub fn make_unavailable(&self, name: &str) {
        self.unavailable.insert(name.to_string());
    }

    /// Move the simulated ref
    pub fn set_revision(&self, revision: impl Into<String>) {
        let mut guard = self.revision.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = revision.into();
    }

    pub fn head_revision(&self) -> String {
        self.revision.read().unwrap_or_else(|poisoned| poisoned.into_inner()).clone()
    }

    /// Keep one version at a fixed revision whatever the simulated ref does
    pub fn pin_revision(&self, name: &str, version: Version, revision: impl Into<String>) {
        self.pinned.insert(PackageIdentity::new(name, version), revision.into());
    }

    fn revision_of(&self, identity: &PackageIdentity) -> String {
        self.pinned
            .get(identity)
            .map(|pinned| pinned.clone())
            .unwrap_or_else(|| self.head_revision())
    }

    /// Number of fetches of one identity so far
    pub fn fetch_count(&self, name: &str, version: &Version) -> usize {
        self.fetches
            .get(&PackageIdentity::new(name, version.clone()))
            .map(|count| *count)
            .unwrap_or(0)
    }

    /// Number of fetches of any identity so far
    pub fn total_fetches(&self) -> usize {
        self.fetches.iter().map(|entry| *entry.value()).sum()
    }

    pub fn listing_count(&self) -> usize {
        self.listings.load(Ordering::SeqCst)
    }

    fn not_found(&self, name: &str, requested: impl Into<String>) -> ShelfError {
        ShelfError::not_found(name, requested, self.spec.descriptor())
    }
}

#[async_trait]
impl Location for MemoryLocation {
    fn spec(&self) -> &LocationSpec {
        &self.spec
    }

    async fn available_versions(&self, name: &str) -> LocationResult<Vec<Version>> {
        self.listings.fetch_add(1, Ordering::SeqCst);

        if self.unavailable.contains(name) {
            return Err(ShelfError::unavailable(self.spec.descriptor(), "simulated outage"));
        }

        self.catalogue
            .get(name)
            .map(|versions| versions.iter().map(|m| m.version.clone()).collect())
            .ok_or_else(|| self.not_found(name, "any"))
    }

    async fn fetch(&self, name: &str, version: &Version) -> LocationResult<CachedPackage> {
        let identity = PackageIdentity::new(name, version.clone());
        *self.fetches.entry(identity.clone()).or_insert(0) += 1;

        if self.broken.contains(&identity) {
            return Err(ShelfError::Download {
                url: self.spec.descriptor(),
                message: format!("simulated failure fetching {}", identity),
                source: None,
            });
        }

        let metadata = self
            .catalogue
            .get(name)
            .and_then(|versions| versions.iter().find(|m| &m.version == version).cloned())
            .ok_or_else(|| self.not_found(name, version.to_string()))?;

        let staging = self.store.staging_dir(name)?;
        let root = staging.path().to_path_buf();
        std::fs::write(root.join(METADATA_JSON), metadata.to_json_pretty()?)
            .map_err(|e| ShelfError::io(format!("Failed to stage {}", identity), e))?;

        debug!(cookbook = %identity, location = %self.spec, "serving from memory");
        let revision = self.revision_of(&identity);
        register(&self.store, root, name, version, Some(revision), self.is_mutable())
    }

    async fn cache_key(&self) -> LocationResult<String> {
        Ok(format!("{}@{}", self.spec.descriptor(), self.head_revision()))
    }

    async fn revision(&self, name: &str, version: &Version) -> LocationResult<Option<String>> {
        Ok(Some(self.revision_of(&PackageIdentity::new(name, version.clone()))))
    }
}

/// Provider over a fixed set of locations, keyed by descriptor
pub struct FixedLocationProvider {
    default: Arc<dyn Location>,
    locations: HashMap<String, Arc<dyn Location>>,
}

impl FixedLocationProvider {
    pub fn new(default: Arc<dyn Location>) -> Self {
        Self {
            default,
            locations: HashMap::new(),
        }
    }

    /// Serve `location` for its own descriptor
    pub fn with(mut self, location: Arc<dyn Location>) -> Self {
        self.locations.insert(location.spec().descriptor(), location);
        self
    }
}

impl LocationProvider for FixedLocationProvider {
    fn location_for(&self, spec: Option<&LocationSpec>) -> LocationResult<Arc<dyn Location>> {
        match spec {
            None => Ok(self.default.clone()),
            Some(spec) if spec.descriptor() == self.default.spec().descriptor() => Ok(self.default.clone()),
            Some(spec) => self
                .locations
                .get(&spec.descriptor())
                .cloned()
                .ok_or_else(|| ShelfError::unavailable(spec.descriptor(), "no such location configured")),
        }
    }

    fn default_spec(&self) -> LocationSpec {
        self.default.spec().clone()
    }
}
