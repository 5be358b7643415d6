//! Lockfile-aware installation
//!
//! When a lockfile was produced from the same roots, the locked versions are
//! materialized as they are and no search runs. Otherwise a full resolution
//! runs and a fresh lockfile is returned for the caller to persist.

use futures::stream::{self, StreamExt};
use shelf_core::error::ShelfError;
use shelf_core::types::{CachedPackage, Dependency, LocationSpec};
use shelf_lockfile::Lockfile;
use std::collections::{BTreeMap, HashMap};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use crate::solver::Resolver;
use crate::ResolverResult;

/// Outcome of an install
#[derive(Debug, Clone)]
pub struct Installation {
    pub lockfile: Lockfile,
    pub packages: BTreeMap<String, CachedPackage>,
    /// True when the given lockfile was used as is
    pub from_lockfile: bool,
}

impl Resolver {
    /// Make every cookbook of the roots available in the store
    #[instrument(skip_all, fields(roots = roots.len(), locked = lockfile.is_some()))]
    pub async fn install(
        &self,
        roots: &[Dependency],
        lockfile: Option<&Lockfile>,
        cancel: &CancellationToken,
    ) -> ResolverResult<Installation> {
        match lockfile {
            Some(lockfile) if lockfile.is_fresh(roots) => {
                info!(entries = lockfile.entries.len(), "lockfile is current");
                let packages = self.materialize(roots, lockfile, cancel).await?;
                Ok(Installation {
                    lockfile: lockfile.clone(),
                    packages,
                    from_lockfile: true,
                })
            },
            stale => {
                if stale.is_some() {
                    info!("lockfile does not match the roots, resolving");
                }
                let resolution = self.resolve(roots, cancel).await?;
                Ok(Installation {
                    lockfile: resolution.lockfile(roots),
                    packages: resolution.packages,
                    from_lockfile: false,
                })
            },
        }
    }

    /// Fetch every locked entry through its own location
    ///
    /// Locked sources carry no credentials, so an entry whose source a root
    /// names goes through the root's own descriptor.
    async fn materialize(
        &self,
        roots: &[Dependency],
        lockfile: &Lockfile,
        cancel: &CancellationToken,
    ) -> ResolverResult<BTreeMap<String, CachedPackage>> {
        let fetcher = self.fetcher();
        let fetcher = &fetcher;

        let declared: HashMap<String, &LocationSpec> = roots
            .iter()
            .filter_map(|root| root.location.as_ref())
            .map(|spec| (spec.descriptor(), spec))
            .collect();

        let mut requests = Vec::with_capacity(lockfile.entries.len());
        for entry in &lockfile.entries {
            let source = declared.get(&entry.source.descriptor()).copied().unwrap_or(&entry.source);
            requests.push((self.provider().location_for(Some(source))?, entry));
        }

        let results: Vec<ResolverResult<CachedPackage>> = stream::iter(&requests)
            .map(|(location, entry)| async move {
                if cancel.is_cancelled() {
                    return Err(ShelfError::Cancelled);
                }
                fetcher.package(location.as_ref(), &entry.name, &entry.version).await
            })
            .buffered(self.options().max_concurrent_fetches)
            .collect()
            .await;

        let mut packages = BTreeMap::new();
        for result in results {
            let package = result?;
            packages.insert(package.name().to_string(), package);
        }
        Ok(packages)
    }
}
