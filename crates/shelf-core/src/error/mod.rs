//! Error types and result aliases for Shelf operations.
//!
//! Provides a unified error type covering every failure a resolution can hit,
//! from transport problems at a location to unsatisfiable constraint chains.

use thiserror::Error;

use crate::types::{ConstraintError, Demand, FailureReport, VersionError};

/// Unified error type for all Shelf operations
#[derive(Error, Debug)]
pub enum ShelfError {
    // Location errors
    #[error("Cookbook '{name}' ({requested}) not found at {location}")]
    NotFound {
        name: String,
        requested: String,
        location: String,
    },

    #[error("Source {location} is unavailable: {message}")]
    SourceUnavailable {
        location: String,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Git ref '{reference}' not found in {uri}")]
    RefNotFound { uri: String, reference: String },

    #[error("Download from {url} failed: {message}")]
    Download {
        url: String,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Authentication against {url} failed: {message}")]
    Authentication { url: String, message: String },

    // Resolution errors
    #[error("Conflicting exact requirements on '{package}': {}", join_demands(.demands))]
    ConstraintConflict { package: String, demands: Vec<Demand> },

    #[error("Unable to find a consistent set of cookbook versions\n{report}")]
    ResolutionFailed { report: FailureReport },

    #[error("Resolution cancelled")]
    Cancelled,

    // Input errors
    #[error("Invalid version '{input}': {reason}")]
    InvalidVersion { input: String, reason: String },

    #[error("Invalid constraint '{input}': {reason}")]
    InvalidConstraint { input: String, reason: String },

    #[error("Failed to parse cookbook metadata at {path}: {message}")]
    MetadataParse { path: String, message: String },

    #[error("Failed to parse lockfile: {message}")]
    LockfileParse { message: String },

    #[error("Configuration field '{field}' is invalid: {reason}")]
    Config { field: String, reason: String },

    #[error("Refusing unsafe path '{path}' outside its destination")]
    UnsafePath { path: String },

    // IO errors
    #[error("IO error: {message}")]
    Io {
        message: String,
        #[source]
        source: std::io::Error,
    },
}

/// Result type alias for Shelf operations
pub type ShelfResult<T> = Result<T, ShelfError>;

fn join_demands(demands: &[Demand]) -> String {
    demands
        .iter()
        .map(|d| d.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl ShelfError {
    /// Create an IO error from std::io::Error
    pub fn io(message: String, source: std::io::Error) -> Self {
        Self::Io { message, source }
    }

    /// Create a download error from any error type
    pub fn download<E>(url: impl Into<String>, message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Download {
            url: url.into(),
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a source-unavailable error without an underlying cause
    pub fn unavailable(location: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SourceUnavailable {
            location: location.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Create a not-found error
    pub fn not_found(name: impl Into<String>, requested: impl Into<String>, location: impl Into<String>) -> Self {
        Self::NotFound {
            name: name.into(),
            requested: requested.into(),
            location: location.into(),
        }
    }

    /// Transient transport failures that are worth retrying
    pub fn is_retryable(&self) -> bool {
        matches!(self, ShelfError::Download { .. } | ShelfError::SourceUnavailable { .. })
    }

    /// Errors that end a resolution instead of rejecting one candidate
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ShelfError::Authentication { .. }
                | ShelfError::Cancelled
                | ShelfError::ConstraintConflict { .. }
                | ShelfError::ResolutionFailed { .. }
                | ShelfError::Config { .. }
                | ShelfError::Io { .. }
        )
    }

    /// Get a user-friendly suggestion for fixing this error
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            ShelfError::NotFound { .. } => {
                Some("Check the cookbook name and version, or point the dependency at another location")
            },
            ShelfError::SourceUnavailable { .. } | ShelfError::Download { .. } => {
                Some("Check your network connection and the location URL, then try again")
            },
            ShelfError::RefNotFound { .. } => Some("Check that the branch, tag or revision exists on the remote"),
            ShelfError::Authentication { .. } => {
                Some("Check the client name and token configured for the Chef server")
            },
            ShelfError::ConstraintConflict { .. } | ShelfError::ResolutionFailed { .. } => {
                Some("Relax one of the listed constraints or pin a version every dependent accepts")
            },
            ShelfError::LockfileParse { .. } => Some("Delete the lockfile and resolve again"),
            _ => None,
        }
    }
}

impl From<VersionError> for ShelfError {
    fn from(err: VersionError) -> Self {
        let input = match &err {
            VersionError::InvalidFormat { input } => input.clone(),
            VersionError::InvalidNumber { component } => component.clone(),
            VersionError::InvalidPrerelease { prerelease } => prerelease.clone(),
            VersionError::InvalidBuild { build } => build.clone(),
        };
        ShelfError::InvalidVersion {
            input,
            reason: err.to_string(),
        }
    }
}

impl From<ConstraintError> for ShelfError {
    fn from(err: ConstraintError) -> Self {
        let input = match &err {
            ConstraintError::InvalidBound { input, .. } | ConstraintError::MissingBound { input } => input.clone(),
        };
        ShelfError::InvalidConstraint {
            input,
            reason: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Constraint, Dependent, PackageIdentity, Version};

    #[test]
    fn test_retryable_classification() {
        assert!(ShelfError::unavailable("git:x", "timed out").is_retryable());
        assert!(ShelfError::Download {
            url: "https://x".into(),
            message: "502".into(),
            source: None
        }
        .is_retryable());
        assert!(!ShelfError::not_found("a", "1.0.0", "site:x").is_retryable());
        assert!(!ShelfError::Authentication {
            url: "https://x".into(),
            message: "401".into()
        }
        .is_retryable());
    }

    #[test]
    fn test_fatal_classification() {
        assert!(ShelfError::Cancelled.is_fatal());
        assert!(ShelfError::Authentication {
            url: "u".into(),
            message: "m".into()
        }
        .is_fatal());
        assert!(!ShelfError::not_found("a", "any", "site:x").is_fatal());
        assert!(!ShelfError::RefNotFound {
            uri: "u".into(),
            reference: "main".into()
        }
        .is_fatal());
    }

    #[test]
    fn test_conflict_message_names_dependents() {
        let err = ShelfError::ConstraintConflict {
            package: "c".into(),
            demands: vec![
                Demand::new(
                    Dependent::Package(PackageIdentity::new("a", Version::new(1, 0, 0))),
                    Constraint::parse("= 1.0").unwrap(),
                ),
                Demand::new(
                    Dependent::Package(PackageIdentity::new("b", Version::new(2, 0, 0))),
                    Constraint::parse("= 1.1").unwrap(),
                ),
            ],
        };
        let message = err.to_string();
        assert!(message.contains("'c'"));
        assert!(message.contains("a@1.0.0 requires = 1.0"));
        assert!(message.contains("b@2.0.0 requires = 1.1"));
        assert!(err.suggestion().is_some());
    }

    #[test]
    fn test_version_error_conversion() {
        let err: ShelfError = VersionError::InvalidFormat { input: "x".into() }.into();
        assert!(matches!(err, ShelfError::InvalidVersion { ref input, .. } if input == "x"));
    }
}
