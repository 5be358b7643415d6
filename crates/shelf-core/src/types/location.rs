//! Location descriptors.
//!
//! A [`LocationSpec`] names where a cookbook comes from. It carries everything
//! needed to build a fetcher for that source and is recorded in the lockfile as
//! the provenance of each resolved cookbook.

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Git reference a dependency is pinned to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GitRef {
    Branch(String),
    Tag(String),
    Rev(String),
}

/// Where a cookbook is obtained from
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LocationSpec {
    Path {
        path: Utf8PathBuf,
    },
    Git {
        uri: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reference: Option<GitRef>,
    },
    Site {
        url: String,
    },
    ChefServer {
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        client_name: Option<String>,
        /// Never written back out
        #[serde(default, skip_serializing)]
        token: Option<String>,
    },
}

impl GitRef {
    /// The ref name as passed to git
    pub fn name(&self) -> &str {
        match self {
            GitRef::Branch(name) | GitRef::Tag(name) | GitRef::Rev(name) => name,
        }
    }

    /// Branches move; tags and revisions do not
    pub fn is_mutable(&self) -> bool {
        matches!(self, GitRef::Branch(_))
    }
}

impl fmt::Display for GitRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GitRef::Branch(name) => write!(f, "branch={}", name),
            GitRef::Tag(name) => write!(f, "tag={}", name),
            GitRef::Rev(name) => write!(f, "rev={}", name),
        }
    }
}

impl LocationSpec {
    pub fn path(path: impl Into<Utf8PathBuf>) -> Self {
        LocationSpec::Path { path: path.into() }
    }

    pub fn git(uri: impl Into<String>, reference: Option<GitRef>) -> Self {
        LocationSpec::Git {
            uri: uri.into(),
            reference,
        }
    }

    pub fn site(url: impl Into<String>) -> Self {
        LocationSpec::Site {
            url: normalize_url(&url.into()),
        }
    }

    pub fn chef_server(url: impl Into<String>, client_name: Option<String>, token: Option<String>) -> Self {
        LocationSpec::ChefServer {
            url: normalize_url(&url.into()),
            client_name,
            token,
        }
    }

    /// Short kind tag
    pub fn kind(&self) -> &'static str {
        match self {
            LocationSpec::Path { .. } => "path",
            LocationSpec::Git { .. } => "git",
            LocationSpec::Site { .. } => "site",
            LocationSpec::ChefServer { .. } => "chef_server",
        }
    }

    /// Canonical one-line description, free of credentials
    pub fn descriptor(&self) -> String {
        match self {
            LocationSpec::Path { path } => format!("path:{}", path),
            LocationSpec::Git { uri, reference } => match reference {
                Some(r) => format!("git:{}#{}", uri, r),
                None => format!("git:{}", uri),
            },
            LocationSpec::Site { url } => format!("site:{}", normalize_url(url)),
            LocationSpec::ChefServer { url, .. } => format!("chef_server:{}", normalize_url(url)),
        }
    }

    /// Whether content at this location can change without the descriptor changing
    pub fn is_mutable(&self) -> bool {
        match self {
            LocationSpec::Git { reference, .. } => reference.as_ref().map_or(true, GitRef::is_mutable),
            LocationSpec::Path { .. } => true,
            LocationSpec::Site { .. } | LocationSpec::ChefServer { .. } => false,
        }
    }

    /// Copy with credentials removed
    pub fn redacted(&self) -> Self {
        match self {
            LocationSpec::ChefServer { url, client_name, .. } => LocationSpec::ChefServer {
                url: url.clone(),
                client_name: client_name.clone(),
                token: None,
            },
            other => other.clone(),
        }
    }
}

impl fmt::Display for LocationSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.descriptor())
    }
}

fn normalize_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptors() {
        assert_eq!(LocationSpec::path("/local/A").descriptor(), "path:/local/A");
        assert_eq!(
            LocationSpec::git("https://example.com/a.git", Some(GitRef::Tag("v1.0.0".into()))).descriptor(),
            "git:https://example.com/a.git#tag=v1.0.0"
        );
        assert_eq!(
            LocationSpec::site("https://supermarket.chef.io/api/v1/").descriptor(),
            "site:https://supermarket.chef.io/api/v1"
        );
    }

    #[test]
    fn test_descriptor_hides_credentials() {
        let spec = LocationSpec::chef_server(
            "https://chef.example.com/organizations/acme",
            Some("builder".into()),
            Some("s3cret".into()),
        );
        assert!(!spec.descriptor().contains("s3cret"));
        assert!(!serde_json::to_string(&spec).unwrap().contains("s3cret"));
        assert_eq!(spec.redacted(), LocationSpec::chef_server(
            "https://chef.example.com/organizations/acme",
            Some("builder".into()),
            None,
        ));
    }

    #[test]
    fn test_mutability() {
        assert!(LocationSpec::git("u", None).is_mutable());
        assert!(LocationSpec::git("u", Some(GitRef::Branch("main".into()))).is_mutable());
        assert!(!LocationSpec::git("u", Some(GitRef::Tag("v1".into()))).is_mutable());
        assert!(!LocationSpec::git("u", Some(GitRef::Rev("abc123".into()))).is_mutable());
        assert!(!LocationSpec::site("https://example.com").is_mutable());
    }

    #[test]
    fn test_serde_tagging() {
        let spec = LocationSpec::git("https://example.com/a.git", Some(GitRef::Branch("main".into())));
        let json = serde_json::to_value(&spec).unwrap();
        assert_eq!(json["type"], "git");
        assert_eq!(json["reference"]["branch"], "main");

        let back: LocationSpec = serde_json::from_value(json).unwrap();
        assert_eq!(back, spec);

        let path: LocationSpec = serde_json::from_str(r#"{"type":"path","path":"/srv/a"}"#).unwrap();
        assert_eq!(path, LocationSpec::path("/srv/a"));
    }
}
