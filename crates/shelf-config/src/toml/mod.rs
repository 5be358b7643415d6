//! config.toml parsing, defaults and validation

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use shelf_core::error::ShelfError;

use crate::ConfigResult;

/// Default community site API endpoint
pub const DEFAULT_SITE_URL: &str = "https://supermarket.chef.io/api/v1";

/// Complete Shelf configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShelfConfig {
    /// Root of all local state
    #[serde(default = "default_shelf_path")]
    pub shelf_path: Utf8PathBuf,

    #[serde(default)]
    pub site: SiteSection,

    #[serde(default)]
    pub chef_server: ChefServerSection,

    #[serde(default)]
    pub network: NetworkSection,

    #[serde(default)]
    pub resolver: ResolverSection,

    #[serde(default)]
    pub git: GitSection,
}

/// Default package index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteSection {
    #[serde(default = "default_site_url")]
    pub url: String,
}

/// Private Chef server defaults
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChefServerSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

/// Per-operation timeout and retry policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkSection {
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

/// Resolver tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverSection {
    /// Upper bound on concurrent fetches
    pub max_concurrent_fetches: usize,
    /// Fetch sibling dependencies ahead of the search
    pub prefetch: bool,
}

/// Git binary settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GitSection {
    pub executable: String,
}

fn default_shelf_path() -> Utf8PathBuf {
    dirs::home_dir()
        .and_then(|home| Utf8PathBuf::from_path_buf(home).ok())
        .map(|home| home.join(".shelf"))
        .unwrap_or_else(|| Utf8PathBuf::from(".shelf"))
}

fn default_site_url() -> String {
    DEFAULT_SITE_URL.to_string()
}

impl Default for ShelfConfig {
    fn default() -> Self {
        Self {
            shelf_path: default_shelf_path(),
            site: SiteSection::default(),
            chef_server: ChefServerSection::default(),
            network: NetworkSection::default(),
            resolver: ResolverSection::default(),
            git: GitSection::default(),
        }
    }
}

impl Default for SiteSection {
    fn default() -> Self {
        Self { url: default_site_url() }
    }
}

impl Default for NetworkSection {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            max_retries: 3,
            initial_backoff_ms: 100,
            max_backoff_ms: 5000,
        }
    }
}

impl Default for ResolverSection {
    fn default() -> Self {
        Self {
            max_concurrent_fetches: 8,
            prefetch: true,
        }
    }
}

impl Default for GitSection {
    fn default() -> Self {
        Self {
            executable: "git".to_string(),
        }
    }
}

impl ShelfConfig {
    /// Directory holding cached cookbooks
    pub fn store_path(&self) -> Utf8PathBuf {
        self.shelf_path.join("cookbooks")
    }

    /// Directory holding git mirrors
    pub fn git_path(&self) -> Utf8PathBuf {
        self.shelf_path.join("git")
    }
}

/// Parse TOML string to ShelfConfig
pub fn parse_config_toml(content: &str) -> ConfigResult<ShelfConfig> {
    let config: ShelfConfig = ::toml::from_str(content).map_err(|e| ShelfError::Config {
        field: "config.toml".to_string(),
        reason: format!("TOML parsing error: {}", e),
    })?;

    validate_config(&config)?;

    Ok(config)
}

/// Serialize ShelfConfig to TOML string
pub fn serialize_config_toml(config: &ShelfConfig) -> ConfigResult<String> {
    ::toml::to_string_pretty(config).map_err(|e| ShelfError::Config {
        field: "config.toml".to_string(),
        reason: format!("TOML serialization error: {}", e),
    })
}

/// Validate configuration values
pub fn validate_config(config: &ShelfConfig) -> ConfigResult<()> {
    validate_url("site.url", &config.site.url)?;

    if let Some(url) = &config.chef_server.url {
        validate_url("chef_server.url", url)?;
    }

    if config.network.timeout_secs == 0 {
        return Err(invalid("network.timeout_secs", "must be greater than zero"));
    }

    if config.network.initial_backoff_ms > config.network.max_backoff_ms {
        return Err(invalid(
            "network.initial_backoff_ms",
            "must not exceed network.max_backoff_ms",
        ));
    }

    if config.resolver.max_concurrent_fetches == 0 {
        return Err(invalid("resolver.max_concurrent_fetches", "must be greater than zero"));
    }

    if config.git.executable.trim().is_empty() {
        return Err(invalid("git.executable", "must not be empty"));
    }

    Ok(())
}

/// Load and parse config.toml from file path
pub async fn load_from_file(path: &Utf8Path) -> ConfigResult<ShelfConfig> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| ShelfError::io(format!("Failed to read {}", path), e))?;

    parse_config_toml(&content).map_err(|e| match e {
        ShelfError::Config { field, reason } => ShelfError::Config {
            field,
            reason: format!("In file {}: {}", path, reason),
        },
        other => other,
    })
}

fn validate_url(field: &str, value: &str) -> ConfigResult<()> {
    let parsed = url::Url::parse(value).map_err(|e| invalid(field, &format!("'{}' is not a valid URL: {}", value, e)))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(invalid(field, &format!("unsupported scheme '{}'", parsed.scheme())));
    }
    Ok(())
}

fn invalid(field: &str, reason: &str) -> ShelfError {
    ShelfError::Config {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}
