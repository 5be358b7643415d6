//! The cookbook store
//!
//! Fetched cookbooks live under `<root>/<name>-<version>/`. Entries are
//! published by renaming a fully populated staging directory into place, so
//! readers never observe a half-written cookbook. The store is addressed
//! only by name and version; which location produced an entry is recorded for
//! reuse decisions but never used for lookup.

pub mod entry;

use camino::{Utf8Path, Utf8PathBuf};
use dashmap::DashMap;
use shelf_core::error::ShelfError;
use shelf_core::types::{CachedPackage, CookbookMetadata, PackageIdentity, Version};
use std::collections::BTreeSet;
use std::fs;
use std::str::FromStr;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use crate::link::link_tree;
use crate::StoreResult;
pub use entry::{EntryRecord, ENTRY_RECORD};

/// Directory under the store root holding in-flight fetches
pub const STAGING_DIR: &str = ".staging";

/// Local cache of fetched cookbooks
#[derive(Debug)]
pub struct CookbookStore {
    root: Utf8PathBuf,
    /// Entries already read from disk
    index: DashMap<PackageIdentity, CachedPackage>,
    /// At most one fetch per identity at a time
    fetch_locks: DashMap<PackageIdentity, Arc<Mutex<()>>>,
}

/// A scratch directory inside the store, removed on drop unless published
#[derive(Debug)]
pub struct StagingDir {
    _inner: TempDir,
    path: Utf8PathBuf,
}

impl StagingDir {
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }
}

impl CookbookStore {
    /// Open (creating if needed) a store rooted at `root`
    pub fn open(root: impl Into<Utf8PathBuf>) -> StoreResult<Self> {
        let root = root.into();

        fs::create_dir_all(&root).map_err(|e| ShelfError::io(format!("Failed to create store at {}", root), e))?;

        let store = Self {
            root,
            index: DashMap::new(),
            fetch_locks: DashMap::new(),
        };

        let removed = store.clean_staging()?;
        if removed > 0 {
            debug!(removed, "removed orphaned staging directories");
        }

        Ok(store)
    }

    /// Get the root path of the store
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// Directory an identity is stored under
    pub fn entry_path(&self, identity: &PackageIdentity) -> Utf8PathBuf {
        self.root.join(identity.dir_name())
    }

    fn staging_root(&self) -> Utf8PathBuf {
        self.root.join(STAGING_DIR)
    }

    fn is_staged(&self, path: &Utf8Path) -> bool {
        path.starts_with(self.staging_root())
    }

    /// Look up an exact version; touches only the local filesystem
    pub fn lookup(&self, name: &str, version: &Version) -> StoreResult<Option<CachedPackage>> {
        if !PackageIdentity::is_valid_name(name) {
            return Ok(None);
        }

        let identity = PackageIdentity::new(name, version.clone());
        let path = self.entry_path(&identity);

        if !path.is_dir() {
            self.index.remove(&identity);
            return Ok(None);
        }

        if let Some(hit) = self.index.get(&identity) {
            return Ok(Some(hit.clone()));
        }

        let Some(record) = EntryRecord::read(&path)? else {
            return Ok(None);
        };

        let metadata = CookbookMetadata::from_dir(&path)?;
        let package = CachedPackage {
            identity: identity.clone(),
            local_path: path,
            metadata,
            revision: record.revision,
        };

        self.index.insert(identity, package.clone());
        Ok(Some(package))
    }

    /// Whether an exact version is stored
    pub fn contains(&self, identity: &PackageIdentity) -> bool {
        self.entry_path(identity).join(ENTRY_RECORD).is_file()
    }

    /// Register a cookbook; the first writer for an identity wins
    ///
    /// `package.local_path` is moved into the store when it lives in a staging
    /// directory and linked in otherwise. Returns the stored entry, which is
    /// the pre-existing one when the identity was already present.
    pub fn insert(&self, package: CachedPackage) -> StoreResult<CachedPackage> {
        self.validate(&package)?;

        let target = self.entry_path(&package.identity);
        if package.local_path == target {
            return self.lookup(package.name(), package.version())?.ok_or_else(|| {
                ShelfError::not_found(package.name(), package.version().to_string(), format!("store:{}", self.root))
            });
        }

        if let Some(existing) = self.lookup_or_repair(&package.identity)? {
            debug!(cookbook = %package.identity, "already stored, keeping existing entry");
            self.discard(&package.local_path);
            return Ok(existing);
        }

        self.publish(package, target)
    }

    /// Replace an entry whose revision stamp differs, for sources whose content moves
    pub fn supersede(&self, package: CachedPackage) -> StoreResult<CachedPackage> {
        if let Some(existing) = self.lookup_or_repair(&package.identity)? {
            if existing.revision == package.revision {
                self.discard(&package.local_path);
                return Ok(existing);
            }
            info!(
                cookbook = %package.identity,
                old = existing.revision.as_deref().unwrap_or("-"),
                new = package.revision.as_deref().unwrap_or("-"),
                "replacing stale store entry"
            );
            self.evict(package.name(), package.version())?;
        }

        self.insert(package)
    }

    /// All locally stored versions of a cookbook
    pub fn versions_for(&self, name: &str) -> StoreResult<BTreeSet<Version>> {
        let mut versions = BTreeSet::new();
        if !PackageIdentity::is_valid_name(name) {
            return Ok(versions);
        }

        let prefix = format!("{}-", name);
        for dir_name in self.entry_dir_names()? {
            let Some(rest) = dir_name.strip_prefix(&prefix) else {
                continue;
            };
            let Ok(version) = Version::from_str(rest) else {
                continue;
            };
            if self.root.join(&dir_name).join(ENTRY_RECORD).is_file() {
                versions.insert(version);
            }
        }

        Ok(versions)
    }

    /// Every stored cookbook, ordered by identity
    pub fn packages(&self) -> StoreResult<Vec<CachedPackage>> {
        let mut packages = Vec::new();

        for dir_name in self.entry_dir_names()? {
            let dir = self.root.join(&dir_name);
            let record = match EntryRecord::read(&dir) {
                Ok(Some(record)) => record,
                Ok(None) => continue,
                Err(e) => {
                    warn!(entry = %dir_name, error = %e, "skipping unreadable store entry");
                    continue;
                },
            };

            match self.lookup(&record.name, &record.version) {
                Ok(Some(package)) => packages.push(package),
                Ok(None) => {},
                Err(e) => warn!(entry = %dir_name, error = %e, "skipping unreadable store entry"),
            }
        }

        packages.sort_by(|a, b| a.identity.cmp(&b.identity));
        Ok(packages)
    }

    /// Remove an entry; returns whether anything was removed
    pub fn evict(&self, name: &str, version: &Version) -> StoreResult<bool> {
        if !PackageIdentity::is_valid_name(name) {
            return Ok(false);
        }

        let identity = PackageIdentity::new(name, version.clone());
        self.index.remove(&identity);

        let path = self.entry_path(&identity);
        if !path.exists() {
            return Ok(false);
        }

        fs::remove_dir_all(&path).map_err(|e| ShelfError::io(format!("Failed to evict {}", path), e))?;
        info!(cookbook = %identity, "evicted from store");
        Ok(true)
    }

    /// Create a scratch directory for an in-flight fetch
    pub fn staging_dir(&self, name: &str) -> StoreResult<StagingDir> {
        let staging_root = self.staging_root();
        fs::create_dir_all(&staging_root)
            .map_err(|e| ShelfError::io(format!("Failed to create {}", staging_root), e))?;

        let prefix = if PackageIdentity::is_valid_name(name) {
            format!("{}-", name)
        } else {
            "fetch-".to_string()
        };

        let inner = tempfile::Builder::new()
            .prefix(&prefix)
            .tempdir_in(&staging_root)
            .map_err(|e| ShelfError::io(format!("Failed to create staging directory in {}", staging_root), e))?;

        let path = Utf8PathBuf::from_path_buf(inner.path().to_path_buf()).map_err(|p| ShelfError::UnsafePath {
            path: p.display().to_string(),
        })?;

        Ok(StagingDir { _inner: inner, path })
    }

    /// Remove every orphaned staging directory
    pub fn clean_staging(&self) -> StoreResult<usize> {
        let staging_root = self.staging_root();
        let entries = match fs::read_dir(&staging_root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(ShelfError::io(format!("Failed to read {}", staging_root), e)),
        };

        let mut removed = 0;
        for entry in entries.filter_map(Result::ok) {
            let path = entry.path();
            let result = if path.is_dir() {
                fs::remove_dir_all(&path)
            } else {
                fs::remove_file(&path)
            };
            match result {
                Ok(()) => removed += 1,
                Err(e) => warn!(path = %path.display(), error = %e, "failed to remove staging entry"),
            }
        }

        Ok(removed)
    }

    /// Acquire the fetch lock for an identity
    pub async fn lock(&self, identity: &PackageIdentity) -> OwnedMutexGuard<()> {
        let mutex = self
            .fetch_locks
            .entry(identity.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        mutex.lock_owned().await
    }

    fn validate(&self, package: &CachedPackage) -> StoreResult<()> {
        if !PackageIdentity::is_valid_name(package.name()) {
            return Err(ShelfError::UnsafePath {
                path: package.name().to_string(),
            });
        }

        if package.metadata.name != package.identity.name || package.metadata.version != package.identity.version {
            return Err(ShelfError::MetadataParse {
                path: package.local_path.to_string(),
                message: format!(
                    "metadata declares {}@{} but the cookbook is being stored as {}",
                    package.metadata.name, package.metadata.version, package.identity
                ),
            });
        }

        if CookbookMetadata::locate(&package.local_path).is_none() {
            return Err(ShelfError::MetadataParse {
                path: package.local_path.to_string(),
                message: "no metadata file in cookbook".to_string(),
            });
        }

        Ok(())
    }

    /// Look up an entry, removing it when it cannot be read
    fn lookup_or_repair(&self, identity: &PackageIdentity) -> StoreResult<Option<CachedPackage>> {
        match self.lookup(&identity.name, &identity.version) {
            Ok(found) => Ok(found),
            Err(e @ ShelfError::Io { .. }) => Err(e),
            Err(e) => {
                warn!(cookbook = %identity, error = %e, "removing corrupt store entry");
                self.evict(&identity.name, &identity.version)?;
                Ok(None)
            },
        }
    }

    fn publish(&self, package: CachedPackage, target: Utf8PathBuf) -> StoreResult<CachedPackage> {
        // Anything outside staging is linked in so the source is left untouched
        let (staged, _scratch) = if self.is_staged(&package.local_path) {
            (package.local_path.clone(), None)
        } else {
            let scratch = self.staging_dir(package.name())?;
            let staged = scratch.path().join("cookbook");
            link_tree(package.local_path.as_std_path(), staged.as_std_path())?;
            (staged, Some(scratch))
        };

        EntryRecord::new(&package.identity, package.revision.clone()).write(&staged)?;

        // A directory without a record is left over from an interrupted publish
        if target.exists() && !target.join(ENTRY_RECORD).is_file() {
            fs::remove_dir_all(&target)
                .map_err(|e| ShelfError::io(format!("Failed to remove incomplete entry {}", target), e))?;
        }

        if let Err(e) = fs::rename(&staged, &target) {
            if let Some(existing) = self.lookup(package.name(), package.version())? {
                debug!(cookbook = %package.identity, "lost publish race, keeping existing entry");
                let _ = fs::remove_dir_all(&staged);
                return Ok(existing);
            }
            return Err(ShelfError::io(format!("Failed to publish {} into {}", package.identity, target), e));
        }

        let stored = CachedPackage {
            local_path: target,
            ..package
        };
        info!(cookbook = %stored.identity, path = %stored.local_path, "stored cookbook");
        self.index.insert(stored.identity.clone(), stored.clone());
        Ok(stored)
    }

    /// Remove a staging directory that will not be published
    fn discard(&self, path: &Utf8Path) {
        if self.is_staged(path) {
            let _ = fs::remove_dir_all(path);
        }
    }

    fn entry_dir_names(&self) -> StoreResult<Vec<String>> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(ShelfError::io(format!("Failed to read store {}", self.root), e)),
        };

        Ok(entries
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().map(|t| t.is_dir()).unwrap_or(false))
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter(|name| !name.starts_with('.'))
            .collect())
    }
}

#[cfg(test)]
mod tests;
