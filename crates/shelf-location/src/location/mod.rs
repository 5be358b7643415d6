//! The location capability and its implementations
//!
//! Every source kind answers the same three questions: which versions of a
//! cookbook it offers, how to materialize one of them into the store, and a
//! cache key that changes whenever the content behind the location may have
//! moved. A successful fetch always registers the cookbook with the store
//! before returning it.

pub mod chef_server;
pub mod git;
pub mod memory;
pub mod path;
pub mod site;

use async_trait::async_trait;
use camino::Utf8PathBuf;
use shelf_core::error::ShelfError;
use shelf_core::types::{CachedPackage, CookbookMetadata, LocationSpec, Version};
use shelf_store::{extract_archive, extract_tar, CookbookStore};

use crate::context::ShelfContext;
use crate::LocationResult;

pub use chef_server::ChefServerLocation;
pub use git::GitLocation;
pub use memory::{FixedLocationProvider, MemoryLocation};
pub use path::PathLocation;
pub use site::SiteLocation;

/// A source cookbooks can be fetched from
#[async_trait]
pub trait Location: Send + Sync {
    /// The descriptor this location was built from
    fn spec(&self) -> &LocationSpec;

    /// Versions of `name` offered here, in the order the source declares them
    async fn available_versions(&self, name: &str) -> LocationResult<Vec<Version>>;

    /// Materialize one version and register it with the store
    async fn fetch(&self, name: &str, version: &Version) -> LocationResult<CachedPackage>;

    /// Changes whenever content behind this location may have changed
    async fn cache_key(&self) -> LocationResult<String>;

    /// Whether stored copies must be revalidated against [`Location::revision`]
    fn is_mutable(&self) -> bool {
        self.spec().is_mutable()
    }

    /// Revision a fetch of `version` would be stamped with right now
    ///
    /// Defaults to the revision part of the cache key. Locations whose
    /// versions live at different revisions override it.
    async fn revision(&self, name: &str, version: &Version) -> LocationResult<Option<String>> {
        let _ = (name, version);
        let cache_key = self.cache_key().await?;
        Ok(revision_from_key(&cache_key, &self.spec().descriptor()).map(str::to_string))
    }
}

/// Revision part of a `descriptor@revision` cache key
pub fn revision_from_key<'a>(cache_key: &'a str, descriptor: &str) -> Option<&'a str> {
    cache_key.strip_prefix(descriptor)?.strip_prefix('@')
}

/// The closed set of real locations
pub enum AnyLocation {
    Path(PathLocation),
    Git(GitLocation),
    Site(SiteLocation),
    ChefServer(ChefServerLocation),
}

impl AnyLocation {
    /// Build the location a descriptor names
    pub fn from_spec(spec: &LocationSpec, ctx: &ShelfContext) -> LocationResult<Self> {
        Ok(match spec {
            LocationSpec::Path { .. } => AnyLocation::Path(PathLocation::new(spec.clone(), ctx)),
            LocationSpec::Git { .. } => AnyLocation::Git(GitLocation::new(spec.clone(), ctx)),
            LocationSpec::Site { .. } => AnyLocation::Site(SiteLocation::new(spec.clone(), ctx)),
            LocationSpec::ChefServer { .. } => AnyLocation::ChefServer(ChefServerLocation::new(spec.clone(), ctx)?),
        })
    }

    fn inner(&self) -> &dyn Location {
        match self {
            AnyLocation::Path(location) => location,
            AnyLocation::Git(location) => location,
            AnyLocation::Site(location) => location,
            AnyLocation::ChefServer(location) => location,
        }
    }
}

#[async_trait]
impl Location for AnyLocation {
    fn spec(&self) -> &LocationSpec {
        self.inner().spec()
    }

    async fn available_versions(&self, name: &str) -> LocationResult<Vec<Version>> {
        self.inner().available_versions(name).await
    }

    async fn fetch(&self, name: &str, version: &Version) -> LocationResult<CachedPackage> {
        self.inner().fetch(name, version).await
    }

    async fn cache_key(&self) -> LocationResult<String> {
        self.inner().cache_key().await
    }

    fn is_mutable(&self) -> bool {
        self.inner().is_mutable()
    }

    async fn revision(&self, name: &str, version: &Version) -> LocationResult<Option<String>> {
        self.inner().revision(name, version).await
    }
}

/// Unpack a gzip tarball (or a plain tar) into `dest` off the async runtime
pub(crate) async fn unpack(bytes: Vec<u8>, dest: Utf8PathBuf, gzip: bool) -> LocationResult<()> {
    let label = dest.to_string();
    tokio::task::spawn_blocking(move || {
        if gzip {
            extract_archive(bytes.as_slice(), dest.as_std_path())
        } else {
            extract_tar(bytes.as_slice(), dest.as_std_path())
        }
    })
    .await
    .map_err(|e| ShelfError::unavailable(label, format!("extraction task failed: {}", e)))?
}

/// Hand a staged cookbook to the store after checking it is what was asked for
///
/// Mutable sources replace an entry whose revision differs; everything else
/// keeps whichever copy was stored first.
pub(crate) fn register(
    store: &CookbookStore,
    root: Utf8PathBuf,
    name: &str,
    version: &Version,
    revision: Option<String>,
    mutable: bool,
) -> LocationResult<CachedPackage> {
    let metadata = CookbookMetadata::from_dir(&root)?;
    if metadata.name != name || &metadata.version != version {
        return Err(ShelfError::MetadataParse {
            path: root.to_string(),
            message: format!(
                "expected {}@{} but the cookbook declares {}@{}",
                name, version, metadata.name, metadata.version
            ),
        });
    }

    let package = CachedPackage::new(root, metadata).with_revision(revision);
    if mutable {
        store.supersede(package)
    } else {
        store.insert(package)
    }
}

impl std::fmt::Debug for AnyLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("AnyLocation").field(&self.spec().descriptor()).finish()
    }
}
