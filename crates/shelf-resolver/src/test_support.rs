//! In-memory cookbook universes for resolver tests

use camino::Utf8PathBuf;
use shelf_core::types::{Constraint, CookbookMetadata, Dependency, LocationSpec, Version};
use shelf_location::{FixedLocationProvider, Location, MemoryLocation};
use shelf_store::CookbookStore;
use std::sync::{Arc, Once};
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

use crate::{Resolver, ResolverOptions};

pub const SITE_URL: &str = "https://supermarket.example.com/api/v1";

static TRACING: Once = Once::new();

/// Route resolver logs to the test output, filtered by `RUST_LOG`
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// A store, a default site and any number of extra locations
pub struct Universe {
    _temp: TempDir,
    pub store: Arc<CookbookStore>,
    pub site: Arc<MemoryLocation>,
    extra: Vec<Arc<MemoryLocation>>,
}

impl Universe {
    pub fn new() -> Self {
        init_tracing();
        let temp = TempDir::new().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().join("cookbooks")).unwrap();
        let store = Arc::new(CookbookStore::open(root).unwrap());
        let site = Arc::new(MemoryLocation::new(LocationSpec::site(SITE_URL), store.clone()));
        Self {
            _temp: temp,
            store,
            site,
            extra: Vec::new(),
        }
    }

    /// Add a location served next to the site
    pub fn location(&mut self, spec: LocationSpec) -> Arc<MemoryLocation> {
        let location = Arc::new(MemoryLocation::new(spec, self.store.clone()));
        self.extra.push(location.clone());
        location
    }

    /// Publish on the site
    pub fn publish(&self, name: &str, version: &str, deps: &[(&str, &str)]) {
        self.site.publish(cookbook(name, version, deps));
    }

    pub fn resolver(&self) -> Resolver {
        self.resolver_with(ResolverOptions::default())
    }

    pub fn resolver_with(&self, options: ResolverOptions) -> Resolver {
        let site: Arc<dyn Location> = self.site.clone();
        let provider = self
            .extra
            .iter()
            .fold(FixedLocationProvider::new(site), |provider, location| {
                let location: Arc<dyn Location> = location.clone();
                provider.with(location)
            });
        Resolver::new(Arc::new(provider), self.store.clone(), options)
    }
}

pub fn cookbook(name: &str, version: &str, deps: &[(&str, &str)]) -> CookbookMetadata {
    deps.iter().fold(
        CookbookMetadata::new(name, version.parse::<Version>().unwrap()),
        |metadata, (dep, constraint)| metadata.depends(*dep, Constraint::parse(constraint).unwrap()),
    )
}

pub fn root(name: &str, constraint: &str) -> Dependency {
    Dependency::parse(name, constraint).unwrap()
}
