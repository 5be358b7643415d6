//! Cookbook identity and cached cookbook records.

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::metadata::CookbookMetadata;
use super::version::Version;

/// Name and exact version of a cookbook
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PackageIdentity {
    pub name: String,
    pub version: Version,
}

/// A cookbook materialized on local disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedPackage {
    pub identity: PackageIdentity,
    pub local_path: Utf8PathBuf,
    pub metadata: CookbookMetadata,
    /// Opaque stamp from the producing location, such as a git commit
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,
}

impl PackageIdentity {
    pub fn new(name: impl Into<String>, version: Version) -> Self {
        Self {
            name: name.into(),
            version,
        }
    }

    /// Check if this is a valid cookbook name
    pub fn is_valid_name(name: &str) -> bool {
        !name.is_empty()
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
            && !name.starts_with(['-', '.'])
    }

    /// Directory name used by the store
    pub fn dir_name(&self) -> String {
        format!("{}-{}", self.name, self.version)
    }
}

impl fmt::Display for PackageIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.version)
    }
}

impl CachedPackage {
    pub fn new(local_path: impl Into<Utf8PathBuf>, metadata: CookbookMetadata) -> Self {
        Self {
            identity: PackageIdentity::new(metadata.name.clone(), metadata.version.clone()),
            local_path: local_path.into(),
            metadata,
            revision: None,
        }
    }

    pub fn with_revision(mut self, revision: Option<String>) -> Self {
        self.revision = revision;
        self
    }

    pub fn name(&self) -> &str {
        &self.identity.name
    }

    pub fn version(&self) -> &Version {
        &self.identity.version
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_display() {
        let id = PackageIdentity::new("nginx", Version::new(2, 7, 1));
        assert_eq!(id.to_string(), "nginx@2.7.1");
        assert_eq!(id.dir_name(), "nginx-2.7.1");
    }

    #[test]
    fn test_valid_names() {
        assert!(PackageIdentity::is_valid_name("build-essential"));
        assert!(PackageIdentity::is_valid_name("my_cookbook"));
        assert!(PackageIdentity::is_valid_name("chef-client2"));

        assert!(!PackageIdentity::is_valid_name(""));
        assert!(!PackageIdentity::is_valid_name("-bad"));
        assert!(!PackageIdentity::is_valid_name("../escape"));
        assert!(!PackageIdentity::is_valid_name("has space"));
        assert!(!PackageIdentity::is_valid_name("a/b"));
    }

    #[test]
    fn test_identity_ordering() {
        let a1 = PackageIdentity::new("a", Version::new(1, 0, 0));
        let a2 = PackageIdentity::new("a", Version::new(2, 0, 0));
        let b1 = PackageIdentity::new("b", Version::new(1, 0, 0));
        assert!(a1 < a2);
        assert!(a2 < b1);
    }

    #[test]
    fn test_cached_package_identity_from_metadata() {
        let meta = CookbookMetadata::new("app", Version::new(0, 3, 0));
        let pkg = CachedPackage::new("/tmp/app-0.3.0", meta).with_revision(Some("abc".into()));
        assert_eq!(pkg.name(), "app");
        assert_eq!(pkg.version(), &Version::new(0, 3, 0));
        assert_eq!(pkg.revision.as_deref(), Some("abc"));
    }
}
