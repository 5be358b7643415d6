//! Private Chef server location

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use chrono::Utc;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use serde::Deserialize;
use sha1::{Digest, Sha1};
use shelf_core::error::ShelfError;
use shelf_core::types::{CachedPackage, CookbookMetadata, LocationSpec, PackageIdentity, Version, METADATA_JSON};
use shelf_core::utils::safe_join;
use shelf_store::CookbookStore;
use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, instrument};

use super::{register, Location};
use crate::context::ShelfContext;
use crate::http::HttpClient;
use crate::LocationResult;

/// Protocol version announced in `X-Chef-Version`
pub const CHEF_PROTOCOL_VERSION: &str = "12.0.0";

/// Manifest segments holding cookbook files
const SEGMENTS: &[&str] = &[
    "all_files",
    "attributes",
    "definitions",
    "files",
    "libraries",
    "providers",
    "recipes",
    "resources",
    "root_files",
    "templates",
];

/// One entry of `GET /cookbooks/{name}`
#[derive(Debug, Deserialize)]
struct CookbookVersions {
    #[serde(default)]
    versions: Vec<VersionRef>,
}

#[derive(Debug, Deserialize)]
struct VersionRef {
    version: String,
}

/// `GET /cookbooks/{name}/{version}`
#[derive(Debug, Deserialize)]
struct CookbookManifest {
    #[serde(default)]
    metadata: Option<serde_json::Value>,
    #[serde(flatten)]
    segments: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ManifestFile {
    path: String,
    url: String,
}

impl CookbookManifest {
    /// Files from every segment, keyed by their path in the cookbook
    fn files(&self) -> BTreeMap<String, String> {
        SEGMENTS
            .iter()
            .filter_map(|segment| self.segments.get(*segment))
            .filter_map(|value| serde_json::from_value::<Vec<ManifestFile>>(value.clone()).ok())
            .flatten()
            .map(|file| (file.path, file.url))
            .collect()
    }
}

/// A Chef server organization
#[derive(Debug)]
pub struct ChefServerLocation {
    spec: LocationSpec,
    url: String,
    client_name: Option<HeaderValue>,
    authorization: Option<HeaderValue>,
    http: HttpClient,
    store: Arc<CookbookStore>,
}

impl ChefServerLocation {
    pub fn new(spec: LocationSpec, ctx: &ShelfContext) -> LocationResult<Self> {
        let (url, client_name, token) = match &spec {
            LocationSpec::ChefServer {
                url,
                client_name,
                token,
            } => (url.trim_end_matches('/').to_string(), client_name.clone(), token.clone()),
            _ => (String::new(), None, None),
        };

        let client_name = client_name
            .map(|name| header_value("chef_server.client_name", &name))
            .transpose()?;
        let authorization = token
            .map(|token| header_value("chef_server.token", &format!("Bearer {}", token)))
            .transpose()?;

        Ok(Self {
            spec,
            url,
            client_name,
            authorization,
            http: ctx.http.clone(),
            store: ctx.store.clone(),
        })
    }

    /// Headers for one API request
    fn headers(&self) -> LocationResult<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert("X-Chef-Version", HeaderValue::from_static(CHEF_PROTOCOL_VERSION));
        headers.insert("X-Ops-Server-API-Version", HeaderValue::from_static("1"));
        headers.insert(
            "X-Ops-Timestamp",
            header_value("timestamp", &Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string())?,
        );
        headers.insert("X-Ops-Content-Hash", header_value("content hash", &content_hash(b""))?);

        if let Some(client_name) = &self.client_name {
            headers.insert("X-Ops-Userid", client_name.clone());
        }
        if let Some(authorization) = &self.authorization {
            headers.insert(AUTHORIZATION, authorization.clone());
        }
        Ok(headers)
    }

    fn not_found(&self, name: &str, requested: impl Into<String>) -> ShelfError {
        ShelfError::not_found(name, requested, self.spec.descriptor())
    }

    /// Write every manifest file below `dest`
    async fn download_files(&self, manifest: &CookbookManifest, dest: &camino::Utf8Path) -> LocationResult<usize> {
        let files = manifest.files();

        for (relative, url) in &files {
            let target = safe_join(dest.as_std_path(), std::path::Path::new(relative))?;
            // File URLs are pre-signed; credentials stay with the API
            let bytes = self
                .http
                .get_bytes(url, &HeaderMap::new())
                .await?
                .ok_or_else(|| ShelfError::Download {
                    url: url.clone(),
                    message: format!("file {} is missing from the server", relative),
                    source: None,
                })?;

            if let Some(parent) = target.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| ShelfError::io(format!("Failed to create {}", parent.display()), e))?;
            }
            tokio::fs::write(&target, bytes)
                .await
                .map_err(|e| ShelfError::io(format!("Failed to write {}", target.display()), e))?;
        }

        Ok(files.len())
    }
}

#[async_trait]
impl Location for ChefServerLocation {
    fn spec(&self) -> &LocationSpec {
        &self.spec
    }

    async fn available_versions(&self, name: &str) -> LocationResult<Vec<Version>> {
        if !PackageIdentity::is_valid_name(name) {
            return Err(self.not_found(name, "any"));
        }

        let url = format!("{}/cookbooks/{}", self.url, name);
        let listing: HashMap<String, CookbookVersions> = self
            .http
            .get_json(&url, &self.headers()?)
            .await?
            .ok_or_else(|| self.not_found(name, "any"))?;

        let versions = listing
            .get(name)
            .map(|entry| {
                entry
                    .versions
                    .iter()
                    .filter_map(|v| Version::from_str(&v.version).ok())
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        debug!(cookbook = name, count = versions.len(), server = %self.url, "listed versions");
        Ok(versions)
    }

    #[instrument(skip(self), fields(server = %self.url))]
    async fn fetch(&self, name: &str, version: &Version) -> LocationResult<CachedPackage> {
        if !PackageIdentity::is_valid_name(name) {
            return Err(self.not_found(name, version.to_string()));
        }

        let url = format!("{}/cookbooks/{}/{}", self.url, name, version);
        let manifest: CookbookManifest = self
            .http
            .get_json(&url, &self.headers()?)
            .await?
            .ok_or_else(|| self.not_found(name, version.to_string()))?;

        let staging = self.store.staging_dir(name)?;
        let root = staging.path().to_path_buf();
        let count = self.download_files(&manifest, &root).await?;

        // The manifest carries metadata even when the cookbook has no metadata.json
        if !root.join(METADATA_JSON).is_file() {
            if let Some(value) = manifest.metadata.clone() {
                let metadata: CookbookMetadata = serde_json::from_value(value).map_err(|e| ShelfError::MetadataParse {
                    path: url.clone(),
                    message: e.to_string(),
                })?;
                tokio::fs::write(root.join(METADATA_JSON), metadata.to_json_pretty()?)
                    .await
                    .map_err(|e| ShelfError::io(format!("Failed to write metadata into {}", root), e))?;
            }
        }

        let package = register(&self.store, root, name, version, None, false)?;
        info!(cookbook = %package.identity, files = count, "downloaded from chef server");
        Ok(package)
    }

    async fn cache_key(&self) -> LocationResult<String> {
        Ok(self.spec.descriptor())
    }
}

/// Base64 SHA-1 of a request body, as `X-Ops-Content-Hash` expects
fn content_hash(body: &[u8]) -> String {
    general_purpose::STANDARD.encode(Sha1::digest(body))
}

fn header_value(field: &str, value: &str) -> LocationResult<HeaderValue> {
    HeaderValue::from_str(value).map_err(|e| ShelfError::Config {
        field: field.to_string(),
        reason: format!("not usable as an HTTP header: {}", e),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use shelf_config::ShelfConfig;
    use tempfile::TempDir;
    use wiremock::matchers::{header, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn context(temp: &TempDir) -> ShelfContext {
        let mut config = ShelfConfig::default();
        config.shelf_path = Utf8PathBuf::from_path_buf(temp.path().join("shelf")).unwrap();
        config.network.max_retries = 0;
        ShelfContext::new(config).unwrap()
    }

    fn spec(url: &str) -> LocationSpec {
        LocationSpec::chef_server(url, Some("builder".to_string()), Some("t0ken".to_string()))
    }

    #[test]
    fn test_content_hash_of_empty_body() {
        assert_eq!(content_hash(b""), "2jmj7l5rSw0yVb/vlWAYkK/YBwk=");
    }

    #[test]
    fn test_invalid_token_is_config_error() {
        let temp = TempDir::new().unwrap();
        let spec = LocationSpec::chef_server("https://chef.example.com", None, Some("bad\ntoken".to_string()));
        assert!(matches!(
            ChefServerLocation::new(spec, &context(&temp)),
            Err(ShelfError::Config { .. })
        ));
    }

    #[tokio::test]
    async fn test_available_versions_sends_credentials() {
        let temp = TempDir::new().unwrap();
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/cookbooks/apt"))
            .and(header("X-Ops-Userid", "builder"))
            .and(header("Authorization", "Bearer t0ken"))
            .and(header("X-Chef-Version", CHEF_PROTOCOL_VERSION))
            .and(header_exists("X-Ops-Timestamp"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "apt": {
                    "url": "https://chef.example.com/cookbooks/apt",
                    "versions": [
                        { "version": "7.4.0", "url": "https://chef.example.com/cookbooks/apt/7.4.0" },
                        { "version": "7.3.0", "url": "https://chef.example.com/cookbooks/apt/7.3.0" }
                    ]
                }
            })))
            .mount(&mock_server)
            .await;

        let location = ChefServerLocation::new(spec(&mock_server.uri()), &context(&temp)).unwrap();
        let versions = location.available_versions("apt").await.unwrap();
        assert_eq!(versions, vec![Version::new(7, 4, 0), Version::new(7, 3, 0)]);
    }

    #[tokio::test]
    async fn test_forbidden_is_authentication_error() {
        let temp = TempDir::new().unwrap();
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403))
            .expect(1)
            .mount(&mock_server)
            .await;

        let location = ChefServerLocation::new(spec(&mock_server.uri()), &context(&temp)).unwrap();
        let err = location.available_versions("apt").await.unwrap_err();
        assert!(matches!(err, ShelfError::Authentication { .. }));
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_fetch_assembles_cookbook_from_manifest() {
        let temp = TempDir::new().unwrap();
        let mock_server = MockServer::start().await;
        let base = mock_server.uri();

        Mock::given(method("GET"))
            .and(path("/cookbooks/apt/7.4.0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "cookbook_name": "apt",
                "version": "7.4.0",
                "metadata": {
                    "name": "apt",
                    "version": "7.4.0",
                    "dependencies": { "compat_resource": ">= 12.0" },
                    "platforms": { "ubuntu": ">= 0.0.0" }
                },
                "recipes": [
                    { "name": "default.rb", "path": "recipes/default.rb", "url": format!("{base}/bookshelf/1") }
                ],
                "root_files": [
                    { "name": "README.md", "path": "README.md", "url": format!("{base}/bookshelf/2") }
                ]
            })))
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/bookshelf/1"))
            .respond_with(ResponseTemplate::new(200).set_body_string("apt_update 'all'\n"))
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/bookshelf/2"))
            .respond_with(ResponseTemplate::new(200).set_body_string("# apt\n"))
            .mount(&mock_server)
            .await;

        let ctx = context(&temp);
        let location = ChefServerLocation::new(spec(&base), &ctx).unwrap();
        let package = location.fetch("apt", &Version::new(7, 4, 0)).await.unwrap();

        assert!(package.local_path.join("recipes/default.rb").is_file());
        assert!(package.local_path.join("README.md").is_file());
        assert!(package.local_path.join(METADATA_JSON).is_file());
        assert!(package.metadata.dependencies.contains_key("compat_resource"));
        assert!(ctx.store.contains(&package.identity));
    }

    #[tokio::test]
    async fn test_manifest_paths_cannot_escape() {
        let temp = TempDir::new().unwrap();
        let mock_server = MockServer::start().await;
        let base = mock_server.uri();

        Mock::given(method("GET"))
            .and(path("/cookbooks/apt/1.0.0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "metadata": { "name": "apt", "version": "1.0.0" },
                "files": [ { "path": "../../escape.txt", "url": format!("{base}/bookshelf/x") } ]
            })))
            .mount(&mock_server)
            .await;

        let location = ChefServerLocation::new(spec(&base), &context(&temp)).unwrap();
        let err = location.fetch("apt", &Version::new(1, 0, 0)).await.unwrap_err();
        assert!(matches!(err, ShelfError::UnsafePath { .. }));
    }
}
