//! Explicit context shared by every location of one invocation

use camino::{Utf8Path, Utf8PathBuf};
use dashmap::DashMap;
use shelf_config::ShelfConfig;
use shelf_core::types::LocationSpec;
use shelf_store::CookbookStore;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

use crate::http::HttpClient;
use crate::location::{AnyLocation, Location};
use crate::LocationResult;

/// Configuration, store and HTTP client for one invocation
#[derive(Debug, Clone)]
pub struct ShelfContext {
    pub config: Arc<ShelfConfig>,
    pub store: Arc<CookbookStore>,
    pub http: HttpClient,
    /// Serializes clone/update of each git mirror
    mirror_locks: Arc<DashMap<Utf8PathBuf, Arc<Mutex<()>>>>,
}

impl ShelfContext {
    /// Open the store the configuration points at
    pub fn new(config: ShelfConfig) -> LocationResult<Self> {
        let store = CookbookStore::open(config.store_path())?;
        Self::with_store(config, Arc::new(store))
    }

    /// Build a context around an already opened store
    pub fn with_store(config: ShelfConfig, store: Arc<CookbookStore>) -> LocationResult<Self> {
        let http = HttpClient::new(&config.network)?;
        Ok(Self {
            config: Arc::new(config),
            store,
            http,
            mirror_locks: Arc::new(DashMap::new()),
        })
    }

    /// Location used by dependencies that do not name one
    pub fn default_spec(&self) -> LocationSpec {
        LocationSpec::site(self.config.site.url.clone())
    }

    /// Fill Chef server credentials missing from a descriptor from the configuration
    pub fn with_credentials(&self, spec: &LocationSpec) -> LocationSpec {
        match spec {
            LocationSpec::ChefServer {
                url,
                client_name,
                token,
            } => LocationSpec::ChefServer {
                url: url.clone(),
                client_name: client_name.clone().or_else(|| self.config.chef_server.client_name.clone()),
                token: token.clone().or_else(|| self.config.chef_server.token.clone()),
            },
            other => other.clone(),
        }
    }

    pub(crate) async fn lock_mirror(&self, mirror: &Utf8Path) -> OwnedMutexGuard<()> {
        let mutex = self
            .mirror_locks
            .entry(mirror.to_path_buf())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        mutex.lock_owned().await
    }
}

/// Hands out the location for a dependency
pub trait LocationProvider: Send + Sync {
    /// The location for a descriptor, or the default location when none is given
    fn location_for(&self, spec: Option<&LocationSpec>) -> LocationResult<Arc<dyn Location>>;

    /// Descriptor used when a dependency names none
    fn default_spec(&self) -> LocationSpec;
}

/// Builds real locations, one instance per descriptor
pub struct DefaultLocationProvider {
    ctx: ShelfContext,
    locations: DashMap<String, Arc<dyn Location>>,
}

impl DefaultLocationProvider {
    pub fn new(ctx: ShelfContext) -> Self {
        Self {
            ctx,
            locations: DashMap::new(),
        }
    }

    pub fn context(&self) -> &ShelfContext {
        &self.ctx
    }
}

impl LocationProvider for DefaultLocationProvider {
    fn location_for(&self, spec: Option<&LocationSpec>) -> LocationResult<Arc<dyn Location>> {
        let spec = match spec {
            Some(spec) => self.ctx.with_credentials(spec),
            None => self.ctx.default_spec(),
        };
        let key = spec.descriptor();

        if let Some(existing) = self.locations.get(&key) {
            return Ok(existing.clone());
        }

        debug!(location = %key, "creating location");
        let location: Arc<dyn Location> = Arc::new(AnyLocation::from_spec(&spec, &self.ctx)?);
        Ok(self.locations.entry(key).or_insert(location).clone())
    }

    fn default_spec(&self) -> LocationSpec {
        self.ctx.default_spec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn context() -> (TempDir, ShelfContext) {
        let temp_dir = TempDir::new().unwrap();
        let mut config = ShelfConfig::default();
        config.shelf_path = Utf8PathBuf::from_path_buf(temp_dir.path().to_path_buf()).unwrap();
        config.chef_server.client_name = Some("builder".to_string());
        config.chef_server.token = Some("t0ken".to_string());
        let ctx = ShelfContext::new(config).unwrap();
        (temp_dir, ctx)
    }

    #[test]
    fn test_context_opens_store_under_shelf_path() {
        let (temp_dir, ctx) = context();
        assert!(ctx.store.root().starts_with(temp_dir.path().to_str().unwrap()));
        assert!(ctx.store.root().is_dir());
    }

    #[test]
    fn test_provider_defaults_to_site() {
        let (_temp, ctx) = context();
        let provider = DefaultLocationProvider::new(ctx);

        let location = provider.location_for(None).unwrap();
        assert_eq!(location.spec(), &LocationSpec::site(shelf_config::toml::DEFAULT_SITE_URL));
        assert!(!location.is_mutable());
    }

    #[test]
    fn test_provider_memoizes_by_descriptor() {
        let (_temp, ctx) = context();
        let provider = DefaultLocationProvider::new(ctx);
        let spec = LocationSpec::path("/srv/cookbooks/app");

        let first = provider.location_for(Some(&spec)).unwrap();
        let second = provider.location_for(Some(&spec)).unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        let other = provider.location_for(Some(&LocationSpec::path("/srv/cookbooks/other"))).unwrap();
        assert!(!Arc::ptr_eq(&first, &other));
    }

    #[test]
    fn test_chef_server_credentials_come_from_config() {
        let (_temp, ctx) = context();
        let spec = LocationSpec::chef_server("https://chef.example.com/organizations/acme", None, None);

        match ctx.with_credentials(&spec) {
            LocationSpec::ChefServer { client_name, token, .. } => {
                assert_eq!(client_name.as_deref(), Some("builder"));
                assert_eq!(token.as_deref(), Some("t0ken"));
            },
            other => panic!("unexpected spec {other}"),
        }

        let explicit = LocationSpec::chef_server("https://chef.example.com", Some("ci".into()), None);
        match ctx.with_credentials(&explicit) {
            LocationSpec::ChefServer { client_name, .. } => assert_eq!(client_name.as_deref(), Some("ci")),
            other => panic!("unexpected spec {other}"),
        }
    }
}
