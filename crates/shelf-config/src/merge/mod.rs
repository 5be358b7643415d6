//! Configuration layering: defaults, then config.toml, then environment overrides

use camino::Utf8PathBuf;
use shelf_core::error::ShelfError;
use std::collections::HashMap;
use tracing::debug;

use crate::toml::{validate_config, ShelfConfig};
use crate::ConfigResult;

/// Prefix shared by every recognised environment variable
pub const ENV_PREFIX: &str = "SHELF_";

/// Main configuration loading interface
pub struct ConfigLoader {
    /// Explicit shelf root, taking precedence over SHELF_PATH and the home directory
    shelf_path: Option<Utf8PathBuf>,
    env_overrides: HashMap<String, String>,
}

/// Configuration layering and merging
pub struct ConfigLayering;

/// Where a configuration value came from
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigSource {
    /// Built-in defaults
    Defaults,
    /// config.toml under the shelf root
    File(Utf8PathBuf),
    /// Environment variable
    Environment(String),
}

impl ConfigLoader {
    /// Create a loader reading overrides from the process environment
    pub fn new() -> Self {
        Self {
            shelf_path: None,
            env_overrides: ConfigLayering::collect_env_overrides(),
        }
    }

    /// Use an explicit shelf root
    pub fn with_shelf_path(mut self, shelf_path: Utf8PathBuf) -> Self {
        self.shelf_path = Some(shelf_path);
        self
    }

    /// Replace the environment overrides
    pub fn with_env_overrides(mut self, overrides: HashMap<String, String>) -> Self {
        self.env_overrides = overrides;
        self
    }

    /// Resolve the shelf root directory
    pub fn resolve_shelf_path(&self) -> Utf8PathBuf {
        if let Some(path) = &self.shelf_path {
            return path.clone();
        }
        if let Some(path) = self.env_overrides.get("SHELF_PATH") {
            return Utf8PathBuf::from(path);
        }
        ShelfConfig::default().shelf_path
    }

    /// Load the layered configuration and report which layers contributed
    pub async fn load(&self) -> ConfigResult<(ShelfConfig, Vec<ConfigSource>)> {
        let shelf_path = self.resolve_shelf_path();
        let config_path = shelf_path.join("config.toml");
        let mut sources = vec![ConfigSource::Defaults];

        let file_config = if config_path.exists() {
            debug!(path = %config_path, "loading configuration file");
            let config = crate::toml::load_from_file(&config_path).await?;
            sources.push(ConfigSource::File(config_path));
            Some(config)
        } else {
            None
        };

        let mut merged = ConfigLayering::merge_configs(file_config, &self.env_overrides)?;
        // The root the file was found under always wins over a path named inside it
        merged.shelf_path = shelf_path;

        sources.extend(
            self.env_overrides
                .keys()
                .filter(|key| ConfigLayering::is_known_override(key))
                .map(|key| ConfigSource::Environment(key.clone())),
        );

        Ok((merged, sources))
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLayering {
    const KNOWN_OVERRIDES: &'static [&'static str] = &[
        "SHELF_PATH",
        "SHELF_SITE_URL",
        "SHELF_CHEF_SERVER_URL",
        "SHELF_CHEF_CLIENT_NAME",
        "SHELF_CHEF_TOKEN",
        "SHELF_TIMEOUT_SECS",
        "SHELF_MAX_RETRIES",
        "SHELF_MAX_CONCURRENT_FETCHES",
        "SHELF_PREFETCH",
        "SHELF_GIT",
    ];

    /// Merge the file layer (if any) over defaults, then apply environment overrides
    pub fn merge_configs(
        file_config: Option<ShelfConfig>,
        env_overrides: &HashMap<String, String>,
    ) -> ConfigResult<ShelfConfig> {
        let mut merged = file_config.unwrap_or_default();

        Self::apply_env_overrides(&mut merged, env_overrides)?;
        validate_config(&merged)?;

        Ok(merged)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(config: &mut ShelfConfig, overrides: &HashMap<String, String>) -> ConfigResult<()> {
        for (key, value) in overrides {
            match key.as_str() {
                "SHELF_PATH" => config.shelf_path = Utf8PathBuf::from(value),
                "SHELF_SITE_URL" => config.site.url = value.clone(),
                "SHELF_CHEF_SERVER_URL" => config.chef_server.url = Some(value.clone()),
                "SHELF_CHEF_CLIENT_NAME" => config.chef_server.client_name = Some(value.clone()),
                "SHELF_CHEF_TOKEN" => config.chef_server.token = Some(value.clone()),
                "SHELF_TIMEOUT_SECS" => config.network.timeout_secs = parse_number(key, value)?,
                "SHELF_MAX_RETRIES" => config.network.max_retries = parse_number(key, value)?,
                "SHELF_MAX_CONCURRENT_FETCHES" => {
                    config.resolver.max_concurrent_fetches = parse_number(key, value)?
                },
                "SHELF_PREFETCH" => config.resolver.prefetch = parse_bool(key, value)?,
                "SHELF_GIT" => config.git.executable = value.clone(),
                _ => {},
            }
        }

        Ok(())
    }

    fn is_known_override(key: &str) -> bool {
        Self::KNOWN_OVERRIDES.contains(&key)
    }

    /// Collect environment variable overrides
    pub fn collect_env_overrides() -> HashMap<String, String> {
        std::env::vars().filter(|(key, _)| key.starts_with(ENV_PREFIX)).collect()
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> ConfigResult<T>
where
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ShelfError::Config {
        field: key.to_string(),
        reason: format!("'{}' is not a valid number: {}", value, e),
    })
}

fn parse_bool(key: &str, value: &str) -> ConfigResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ShelfError::Config {
            field: key.to_string(),
            reason: format!("'{}' is not a boolean", other),
        }),
    }
}
