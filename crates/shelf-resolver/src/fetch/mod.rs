//! Fetch coordination for one resolution
//!
//! Every listing and fetch the resolver makes goes through a [`Fetcher`]. It
//! remembers results for the lifetime of one resolution, serves cookbooks
//! from the store when the stored copy is still current for its location,
//! and takes the store's per-identity lock so a cookbook is never fetched
//! twice at the same time.

use dashmap::DashMap;
use futures::stream::{self, StreamExt};
use shelf_core::error::ShelfError;
use shelf_core::types::{CachedPackage, PackageIdentity, Version};
use shelf_location::Location;
use shelf_store::CookbookStore;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::ResolverResult;

/// (location descriptor, identity)
type FetchKey = (String, PackageIdentity);

/// Memoizing, store-aware access to locations
pub struct Fetcher {
    store: Arc<CookbookStore>,
    concurrency: usize,
    listings: DashMap<(String, String), Vec<Version>>,
    packages: DashMap<FetchKey, CachedPackage>,
    failures: DashMap<FetchKey, String>,
}

impl Fetcher {
    pub fn new(store: Arc<CookbookStore>, concurrency: usize) -> Self {
        Self {
            store,
            concurrency: concurrency.max(1),
            listings: DashMap::new(),
            packages: DashMap::new(),
            failures: DashMap::new(),
        }
    }

    /// Versions `location` offers for `name`
    ///
    /// When the location is unreachable, the versions already in the store
    /// stand in for the listing.
    pub async fn versions(&self, location: &dyn Location, name: &str) -> ResolverResult<Vec<Version>> {
        let key = (location.spec().descriptor(), name.to_string());
        if let Some(listed) = self.listings.get(&key) {
            return Ok(listed.clone());
        }

        let listed = match location.available_versions(name).await {
            Ok(listed) => listed,
            Err(e) if e.is_retryable() => {
                let stored = self.store.versions_for(name)?;
                if stored.is_empty() {
                    return Err(e);
                }
                warn!(cookbook = name, location = %key.0, error = %e, "location unavailable, using stored versions");
                stored.into_iter().collect()
            },
            Err(e) => return Err(e),
        };

        self.listings.insert(key, listed.clone());
        Ok(listed)
    }

    /// List several names concurrently; results keep request order
    pub async fn versions_all(
        &self,
        requests: &[(Arc<dyn Location>, String)],
    ) -> Vec<ResolverResult<Vec<Version>>> {
        stream::iter(requests)
            .map(|(location, name)| self.versions(location.as_ref(), name))
            .buffered(self.concurrency)
            .collect()
            .await
    }

    /// The cookbook `name` at `version`, fetched at most once per resolution
    pub async fn package(&self, location: &dyn Location, name: &str, version: &Version) -> ResolverResult<CachedPackage> {
        let key: FetchKey = (location.spec().descriptor(), PackageIdentity::new(name, version.clone()));
        if let Some(found) = self.remembered(&key) {
            return found;
        }

        let _guard = self.store.lock(&key.1).await;
        if let Some(found) = self.remembered(&key) {
            return found;
        }

        let result = match self.stored(location, &key).await {
            Ok(Some(package)) => {
                debug!(cookbook = %key.1, "served from store");
                Ok(package)
            },
            Ok(None) => location.fetch(name, version).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(package) => {
                self.packages.insert(key, package.clone());
                Ok(package)
            },
            Err(e) => {
                if !e.is_fatal() {
                    self.failures.insert(key, e.to_string());
                }
                Err(e)
            },
        }
    }

    /// Fetch several cookbooks concurrently, ignoring failures
    ///
    /// Failures are remembered and surface again when the resolver asks for
    /// the same cookbook, so prefetching never changes the outcome.
    pub async fn prefetch(&self, requests: &[(Arc<dyn Location>, String, Version)]) {
        if requests.is_empty() {
            return;
        }
        let results: Vec<ResolverResult<CachedPackage>> = stream::iter(requests)
            .map(|(location, name, version)| self.package(location.as_ref(), name, version))
            .buffered(self.concurrency)
            .collect()
            .await;

        for (request, result) in requests.iter().zip(results) {
            if let Err(e) = result {
                debug!(cookbook = %request.1, version = %request.2, error = %e, "prefetch failed");
            }
        }
    }

    /// Number of distinct cookbooks obtained so far
    pub fn fetched(&self) -> usize {
        self.packages.len()
    }

    fn remembered(&self, key: &FetchKey) -> Option<ResolverResult<CachedPackage>> {
        if let Some(package) = self.packages.get(key) {
            return Some(Ok(package.clone()));
        }
        self.failures.get(key).map(|message| {
            Err(ShelfError::Download {
                url: key.0.clone(),
                message: message.clone(),
                source: None,
            })
        })
    }

    /// Stored copy, when it is still current for `location`
    async fn stored(&self, location: &dyn Location, key: &FetchKey) -> ResolverResult<Option<CachedPackage>> {
        let Some(stored) = self.store.lookup(&key.1.name, &key.1.version)? else {
            return Ok(None);
        };
        if !location.is_mutable() {
            return Ok(Some(stored));
        }

        let current = location.revision(&key.1.name, &key.1.version).await?;
        if current.is_some() && stored.revision == current {
            Ok(Some(stored))
        } else {
            debug!(cookbook = %key.1, revision = current.as_deref().unwrap_or("-"), "stored copy is stale");
            Ok(None)
        }
    }
}
