//! Cookbook version types.
//!
//! Versions follow semantic versioning precedence. Cookbook authors frequently
//! write two-component versions, so `1.0` parses as `1.0.0`.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Semantic version (major.minor.patch-prerelease+build)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pub prerelease: Option<String>,
    pub build: Option<String>,
}

/// Version with optional trailing components, as written in a constraint bound
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PartialVersion {
    pub major: u64,
    pub minor: Option<u64>,
    pub patch: Option<u64>,
    pub prerelease: Option<String>,
}

/// Version parsing and validation errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VersionError {
    #[error("Invalid version format: {input}")]
    InvalidFormat { input: String },

    #[error("Invalid number in version: {component}")]
    InvalidNumber { component: String },

    #[error("Invalid prerelease identifier: {prerelease}")]
    InvalidPrerelease { prerelease: String },

    #[error("Invalid build metadata: {build}")]
    InvalidBuild { build: String },
}

impl Version {
    /// Create a new version
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
            prerelease: None,
            build: None,
        }
    }

    /// Check if this is a prerelease version
    pub fn is_prerelease(&self) -> bool {
        self.prerelease.is_some()
    }

    /// Compare by semver precedence, ignoring build metadata
    pub fn precedence_cmp(&self, other: &Self) -> Ordering {
        match (self.major, self.minor, self.patch).cmp(&(other.major, other.minor, other.patch)) {
            Ordering::Equal => match (&self.prerelease, &other.prerelease) {
                (None, None) => Ordering::Equal,
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (Some(a), Some(b)) => compare_prerelease(a, b),
            },
            other => other,
        }
    }

    /// Parse a version tag such as `v1.2.3` or `1.2`, returning None for other tags
    pub fn from_tag(tag: &str) -> Option<Self> {
        let candidate = tag.strip_prefix('v').unwrap_or(tag);
        Version::from_str(candidate).ok()
    }
}

/// Compare dot-separated prerelease identifiers; numeric identifiers sort numerically
fn compare_prerelease(a: &str, b: &str) -> Ordering {
    let mut left = a.split('.');
    let mut right = b.split('.');

    loop {
        match (left.next(), right.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) => {
                let ord = match (x.parse::<u64>(), y.parse::<u64>()) {
                    (Ok(x), Ok(y)) => x.cmp(&y),
                    (Ok(_), Err(_)) => Ordering::Less,
                    (Err(_), Ok(_)) => Ordering::Greater,
                    (Err(_), Err(_)) => x.cmp(y),
                };
                if ord != Ordering::Equal {
                    return ord;
                }
            },
        }
    }
}

fn parse_number(component: &str) -> Result<u64, VersionError> {
    if component.is_empty() || !component.chars().all(|c| c.is_ascii_digit()) {
        return Err(VersionError::InvalidNumber {
            component: component.to_string(),
        });
    }
    component.parse().map_err(|_| VersionError::InvalidNumber {
        component: component.to_string(),
    })
}

fn valid_identifiers(value: &str) -> bool {
    !value.is_empty()
        && value
            .split('.')
            .all(|part| !part.is_empty() && part.chars().all(|c| c.is_ascii_alphanumeric() || c == '-'))
}

/// Split `core-pre+build` and validate the suffixes
fn split_suffixes(input: &str) -> Result<(&str, Option<String>, Option<String>), VersionError> {
    let (version_part, build) = match input.split_once('+') {
        Some((v, b)) => {
            if !valid_identifiers(b) {
                return Err(VersionError::InvalidBuild { build: b.to_string() });
            }
            (v, Some(b.to_string()))
        },
        None => (input, None),
    };

    let (core_part, prerelease) = match version_part.split_once('-') {
        Some((c, p)) => {
            if !valid_identifiers(p) {
                return Err(VersionError::InvalidPrerelease {
                    prerelease: p.to_string(),
                });
            }
            (c, Some(p.to_string()))
        },
        None => (version_part, None),
    };

    Ok((core_part, prerelease, build))
}

impl FromStr for Version {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let input = s.trim();
        let (core_part, prerelease, build) = split_suffixes(input)?;

        let parts: Vec<&str> = core_part.split('.').collect();
        if parts.len() < 2 || parts.len() > 3 {
            return Err(VersionError::InvalidFormat {
                input: input.to_string(),
            });
        }

        let major = parse_number(parts[0])?;
        let minor = parse_number(parts[1])?;
        let patch = match parts.get(2) {
            Some(p) => parse_number(p)?,
            None => 0,
        };

        Ok(Version {
            major,
            minor,
            patch,
            prerelease,
            build,
        })
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;

        if let Some(ref pre) = self.prerelease {
            write!(f, "-{}", pre)?;
        }

        if let Some(ref build) = self.build {
            write!(f, "+{}", build)?;
        }

        Ok(())
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        // Build metadata only breaks ties so that Ord agrees with Eq
        self.precedence_cmp(other)
            .then_with(|| self.build.cmp(&other.build))
    }
}

impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Version::from_str(&raw).map_err(serde::de::Error::custom)
    }
}

impl PartialVersion {
    /// Fill missing components with zero
    pub fn to_version(&self) -> Version {
        Version {
            major: self.major,
            minor: self.minor.unwrap_or(0),
            patch: self.patch.unwrap_or(0),
            prerelease: self.prerelease.clone(),
            build: None,
        }
    }
}

impl FromStr for PartialVersion {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let input = s.trim();
        let (core_part, prerelease, _build) = split_suffixes(input)?;

        let parts: Vec<&str> = core_part.split('.').collect();
        if parts.is_empty() || parts.len() > 3 {
            return Err(VersionError::InvalidFormat {
                input: input.to_string(),
            });
        }

        let major = parse_number(parts[0])?;
        let minor = parts.get(1).map(|p| parse_number(p)).transpose()?;
        let patch = parts.get(2).map(|p| parse_number(p)).transpose()?;

        Ok(PartialVersion {
            major,
            minor,
            patch,
            prerelease,
        })
    }
}

impl From<Version> for PartialVersion {
    fn from(version: Version) -> Self {
        PartialVersion {
            major: version.major,
            minor: Some(version.minor),
            patch: Some(version.patch),
            prerelease: version.prerelease,
        }
    }
}

impl fmt::Display for PartialVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.major)?;
        if let Some(minor) = self.minor {
            write!(f, ".{}", minor)?;
        }
        if let Some(patch) = self.patch {
            write!(f, ".{}", patch)?;
        }
        if let Some(ref pre) = self.prerelease {
            write!(f, "-{}", pre)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_parsing() {
        let v = Version::from_str("1.2.3").unwrap();
        assert_eq!(v, Version::new(1, 2, 3));

        let v = Version::from_str("1.2.3-alpha.1+build.5").unwrap();
        assert_eq!(v.prerelease.as_deref(), Some("alpha.1"));
        assert_eq!(v.build.as_deref(), Some("build.5"));
        assert!(v.is_prerelease());
        assert!(!Version::new(1, 2, 3).is_prerelease());
    }

    #[test]
    fn test_two_component_version() {
        let v = Version::from_str("1.0").unwrap();
        assert_eq!(v, Version::new(1, 0, 0));
        assert_eq!(v.to_string(), "1.0.0");
    }

    #[test]
    fn test_invalid_versions() {
        assert!(Version::from_str("1").is_err());
        assert!(Version::from_str("1.2.3.4").is_err());
        assert!(Version::from_str("1.x.0").is_err());
        assert!(Version::from_str("1.+2.0").is_err());
        assert!(Version::from_str("1.2.3-").is_err());
        assert!(Version::from_str("").is_err());
    }

    #[test]
    fn test_version_ordering() {
        let v1 = Version::from_str("1.0.0-alpha").unwrap();
        let v2 = Version::from_str("1.0.0-alpha.1").unwrap();
        let v3 = Version::from_str("1.0.0-beta.2").unwrap();
        let v4 = Version::from_str("1.0.0-beta.11").unwrap();
        let v5 = Version::from_str("1.0.0").unwrap();
        let v6 = Version::from_str("1.10.0").unwrap();

        assert!(v1 < v2);
        assert!(v2 < v3);
        assert!(v3 < v4);
        assert!(v4 < v5);
        assert!(v5 < v6);
    }

    #[test]
    fn test_build_metadata_ignored_for_precedence() {
        let a = Version::from_str("1.0.0+a").unwrap();
        let b = Version::from_str("1.0.0+b").unwrap();
        assert_eq!(a.precedence_cmp(&b), Ordering::Equal);
        assert_ne!(a, b);
    }

    #[test]
    fn test_from_tag() {
        assert_eq!(Version::from_tag("v1.2.3"), Some(Version::new(1, 2, 3)));
        assert_eq!(Version::from_tag("2.1"), Some(Version::new(2, 1, 0)));
        assert_eq!(Version::from_tag("release-candidate"), None);
        assert_eq!(Version::from_tag("vnext"), None);
    }

    #[test]
    fn test_partial_version() {
        let p = PartialVersion::from_str("2.1").unwrap();
        assert_eq!(p.major, 2);
        assert_eq!(p.minor, Some(1));
        assert_eq!(p.patch, None);
        assert_eq!(p.to_string(), "2.1");
        assert_eq!(p.to_version(), Version::new(2, 1, 0));
    }

    #[test]
    fn test_serde_as_string() {
        let v = Version::new(3, 0, 1);
        let json = serde_json::to_string(&v).unwrap();
        assert_eq!(json, "\"3.0.1\"");
        let back: Version = serde_json::from_str(&json).unwrap();
        assert_eq!(back, v);
    }
}
