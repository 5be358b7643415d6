//! Dependency specification types.
//!
//! A [`Dependency`] is one requirement on a named cookbook: the constraints
//! that must hold on its version and, optionally, where to fetch it from.

use serde::{Deserialize, Serialize};

use super::constraint::{Constraint, ConstraintError, ConstraintSet};
use super::location::LocationSpec;

/// Requirement on a named cookbook
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dependency {
    pub name: String,
    #[serde(with = "constraint_list")]
    pub constraints: ConstraintSet,
    /// None means the configured default site
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<LocationSpec>,
}

impl Dependency {
    /// Create a dependency with the given constraints and no explicit location
    pub fn new(name: impl Into<String>, constraints: ConstraintSet) -> Self {
        Self {
            name: name.into(),
            constraints,
            location: None,
        }
    }

    /// Create a dependency from a constraint string such as `~> 2.1`
    pub fn parse(name: impl Into<String>, constraint: &str) -> Result<Self, ConstraintError> {
        Ok(Self::new(name, ConstraintSet::parse(constraint)?))
    }

    /// Add a constraint to this dependency
    pub fn with_constraint(mut self, constraint: Constraint) -> Self {
        self.constraints.push(constraint);
        self
    }

    /// Pin this dependency to a location
    pub fn with_location(mut self, location: LocationSpec) -> Self {
        self.location = Some(location);
        self
    }
}

/// Constraint sets travel as a list of strings
mod constraint_list {
    use super::{Constraint, ConstraintSet};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(set: &ConstraintSet, serializer: S) -> Result<S::Ok, S::Error> {
        let items: Vec<&Constraint> = set.iter().collect();
        items.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<ConstraintSet, D::Error> {
        let items = Vec::<Constraint>::deserialize(deserializer)?;
        Ok(items.into_iter().collect())
    }
}
