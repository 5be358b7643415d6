//! Common utilities for benchmarks

use camino::Utf8PathBuf;
use criterion::Criterion;
use pprof::criterion::{Output, PProfProfiler};
use shelf_core::types::{Constraint, CookbookMetadata, Dependency, LocationSpec, Version};
use shelf_location::{FixedLocationProvider, Location, MemoryLocation};
use shelf_resolver::{Resolver, ResolverOptions};
use shelf_store::CookbookStore;
use std::sync::Arc;
use tempfile::TempDir;

/// Configure criterion with flamegraph profiling support
pub fn criterion_config() -> Criterion {
    Criterion::default()
        .warm_up_time(std::time::Duration::from_secs(3))
        .measurement_time(std::time::Duration::from_secs(10))
        .sample_size(100)
        .with_profiler(PProfProfiler::new(100, Output::Flamegraph(None)))
}

/// An in-memory site backed by a throwaway store
pub struct BenchUniverse {
    _temp: TempDir,
    pub store: Arc<CookbookStore>,
    pub site: Arc<MemoryLocation>,
}

impl BenchUniverse {
    pub fn new() -> Self {
        let temp = TempDir::new().expect("temp dir");
        let root = Utf8PathBuf::from_path_buf(temp.path().join("cookbooks")).expect("utf-8 temp path");
        let store = Arc::new(CookbookStore::open(root).expect("store"));
        let site = Arc::new(MemoryLocation::new(
            LocationSpec::site("https://supermarket.example.com/api/v1"),
            store.clone(),
        ));
        Self {
            _temp: temp,
            store,
            site,
        }
    }

    /// `depth` layers of `width` cookbooks, each depending on the whole next layer
    ///
    /// Returns the roots: every cookbook of the first layer.
    pub fn layered(depth: usize, width: usize, versions: u64) -> (Self, Vec<Dependency>) {
        let universe = Self::new();
        for layer in 0..depth {
            for index in 0..width {
                for minor in 0..versions {
                    let mut metadata = CookbookMetadata::new(layer_name(layer, index), Version::new(1, minor, 0));
                    if layer + 1 < depth {
                        for next in 0..width {
                            metadata = metadata.depends(layer_name(layer + 1, next), constraint("~> 1.0"));
                        }
                    }
                    universe.site.publish(metadata);
                }
            }
        }
        let roots = (0..width)
            .map(|index| Dependency::new(layer_name(0, index), Constraint::any().into()))
            .collect();
        (universe, roots)
    }

    /// One root whose `versions` newest releases all need a leaf that does not exist
    ///
    /// Only the oldest release resolves, so every other one is tried and undone.
    pub fn backtracking(versions: u64) -> (Self, Vec<Dependency>) {
        let universe = Self::new();
        universe.site.publish(CookbookMetadata::new("leaf", Version::new(1, 0, 0)));
        for major in 1..=versions {
            let needs = if major == 1 { ">= 1.0" } else { ">= 2.0" };
            universe
                .site
                .publish(CookbookMetadata::new("top", Version::new(major, 0, 0)).depends("leaf", constraint(needs)));
        }
        (universe, vec![Dependency::new("top", Constraint::any().into())])
    }

    pub fn resolver(&self, options: ResolverOptions) -> Resolver {
        let site: Arc<dyn Location> = self.site.clone();
        Resolver::new(Arc::new(FixedLocationProvider::new(site)), self.store.clone(), options)
    }
}

impl Default for BenchUniverse {
    fn default() -> Self {
        Self::new()
    }
}

fn layer_name(layer: usize, index: usize) -> String {
    format!("l{}-cookbook-{}", layer, index)
}

fn constraint(text: &str) -> Constraint {
    Constraint::parse(text).expect("valid constraint")
}
