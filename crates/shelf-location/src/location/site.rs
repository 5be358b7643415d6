//! Community site (Supermarket v1 API) location

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use serde::Deserialize;
use shelf_core::error::ShelfError;
use shelf_core::types::{CachedPackage, LocationSpec, PackageIdentity, Version};
use shelf_store::{cookbook_root, CookbookStore};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, instrument};

use super::{register, unpack, Location};
use crate::context::ShelfContext;
use crate::http::HttpClient;
use crate::LocationResult;

/// `GET /cookbooks/{name}`
#[derive(Debug, Deserialize)]
struct CookbookListing {
    #[serde(default)]
    versions: Vec<String>,
}

/// `GET /cookbooks/{name}/versions/{version}`
#[derive(Debug, Deserialize)]
struct VersionListing {
    file: String,
}

/// A package index speaking the community site API
#[derive(Debug)]
pub struct SiteLocation {
    spec: LocationSpec,
    url: String,
    http: HttpClient,
    store: Arc<CookbookStore>,
}

impl SiteLocation {
    pub fn new(spec: LocationSpec, ctx: &ShelfContext) -> Self {
        let url = match &spec {
            LocationSpec::Site { url } => url.trim_end_matches('/').to_string(),
            _ => String::new(),
        };
        Self {
            spec,
            url,
            http: ctx.http.clone(),
            store: ctx.store.clone(),
        }
    }

    fn not_found(&self, name: &str, requested: impl Into<String>) -> ShelfError {
        ShelfError::not_found(name, requested, self.spec.descriptor())
    }

    /// Versions appear in URLs with dots replaced by underscores
    fn version_from_uri(uri: &str) -> Option<Version> {
        let segment = uri.trim_end_matches('/').rsplit('/').next()?;
        Version::from_str(&segment.replace('_', ".")).ok()
    }

    fn version_segment(version: &Version) -> String {
        version.to_string().replace('.', "_")
    }
}

#[async_trait]
impl Location for SiteLocation {
    fn spec(&self) -> &LocationSpec {
        &self.spec
    }

    async fn available_versions(&self, name: &str) -> LocationResult<Vec<Version>> {
        if !PackageIdentity::is_valid_name(name) {
            return Err(self.not_found(name, "any"));
        }

        let url = format!("{}/cookbooks/{}", self.url, name);
        let listing: CookbookListing = self
            .http
            .get_json(&url, &HeaderMap::new())
            .await?
            .ok_or_else(|| self.not_found(name, "any"))?;

        let versions: Vec<Version> = listing
            .versions
            .iter()
            .filter_map(|uri| {
                let version = Self::version_from_uri(uri);
                if version.is_none() {
                    debug!(cookbook = name, uri = %uri, "skipping unparseable version");
                }
                version
            })
            .collect();

        debug!(cookbook = name, count = versions.len(), site = %self.url, "listed versions");
        Ok(versions)
    }

    #[instrument(skip(self), fields(site = %self.url))]
    async fn fetch(&self, name: &str, version: &Version) -> LocationResult<CachedPackage> {
        if !PackageIdentity::is_valid_name(name) {
            return Err(self.not_found(name, version.to_string()));
        }

        let url = format!("{}/cookbooks/{}/versions/{}", self.url, name, Self::version_segment(version));
        let listing: VersionListing = self
            .http
            .get_json(&url, &HeaderMap::new())
            .await?
            .ok_or_else(|| self.not_found(name, version.to_string()))?;

        let archive = self
            .http
            .get_bytes(&listing.file, &HeaderMap::new())
            .await?
            .ok_or_else(|| self.not_found(name, version.to_string()))?;

        let staging = self.store.staging_dir(name)?;
        unpack(archive, staging.path().to_path_buf(), true).await?;
        let root = cookbook_root(staging.path())?;

        let package = register(&self.store, root, name, version, None, false)?;
        info!(cookbook = %package.identity, "downloaded from site");
        Ok(package)
    }

    async fn cache_key(&self) -> LocationResult<String> {
        Ok(self.spec.descriptor())
    }
}
