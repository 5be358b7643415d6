//! Version constraints.
//!
//! A [`Constraint`] pairs an operator with a (possibly partial) bound. The
//! pessimistic operator `~>` admits versions at or above the bound that keep
//! the bound's major component, and its minor component too when the bound
//! names a patch. A [`ConstraintSet`] is the intersection of several
//! constraints on one package name.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use super::version::{PartialVersion, Version, VersionError};

/// Comparison operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Eq,
    Gt,
    Ge,
    Lt,
    Le,
    Pessimistic,
}

/// A single version constraint such as `~> 2.1` or `>= 1.0`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Constraint {
    pub op: Op,
    pub bound: PartialVersion,
}

/// Constraint parsing errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConstraintError {
    #[error("Invalid constraint '{input}': {source}")]
    InvalidBound {
        input: String,
        #[source]
        source: VersionError,
    },

    #[error("Invalid constraint '{input}': missing version after operator")]
    MissingBound { input: String },
}

/// Intersection of constraints on a single package
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ConstraintSet {
    constraints: Vec<Constraint>,
}

impl Op {
    /// Operator symbol as written in metadata
    pub fn symbol(&self) -> &'static str {
        match self {
            Op::Eq => "=",
            Op::Gt => ">",
            Op::Ge => ">=",
            Op::Lt => "<",
            Op::Le => "<=",
            Op::Pessimistic => "~>",
        }
    }
}

impl Constraint {
    /// Parse a constraint string; a bare version means `=`, empty or `*` means any
    pub fn parse(input: &str) -> Result<Self, ConstraintError> {
        let trimmed = input.trim();

        if trimmed.is_empty() || trimmed == "*" {
            return Ok(Self::any());
        }

        // Longer operators first so ">=" is not read as ">"
        let (op, rest) = if let Some(rest) = trimmed.strip_prefix("~>") {
            (Op::Pessimistic, rest)
        } else if let Some(rest) = trimmed.strip_prefix(">=") {
            (Op::Ge, rest)
        } else if let Some(rest) = trimmed.strip_prefix("<=") {
            (Op::Le, rest)
        } else if let Some(rest) = trimmed.strip_prefix('>') {
            (Op::Gt, rest)
        } else if let Some(rest) = trimmed.strip_prefix('<') {
            (Op::Lt, rest)
        } else if let Some(rest) = trimmed.strip_prefix('=') {
            (Op::Eq, rest)
        } else {
            (Op::Eq, trimmed)
        };

        let rest = rest.trim();
        if rest.is_empty() {
            return Err(ConstraintError::MissingBound {
                input: input.to_string(),
            });
        }

        let bound = PartialVersion::from_str(rest).map_err(|source| ConstraintError::InvalidBound {
            input: input.to_string(),
            source,
        })?;

        Ok(Self { op, bound })
    }

    /// Constraint satisfied by every version (`>= 0.0.0`)
    pub fn any() -> Self {
        Self {
            op: Op::Ge,
            bound: PartialVersion::from(Version::new(0, 0, 0)),
        }
    }

    /// Constraint pinning exactly one version
    pub fn exact(version: Version) -> Self {
        Self {
            op: Op::Eq,
            bound: PartialVersion::from(version),
        }
    }

    /// Whether this constraint pins a single version
    pub fn is_exact(&self) -> bool {
        self.op == Op::Eq
    }

    /// Whether this constraint admits every version
    pub fn is_any(&self) -> bool {
        self.op == Op::Ge && self.bound.to_version() == Version::new(0, 0, 0)
    }

    /// Check whether a version satisfies this constraint
    pub fn satisfied_by(&self, version: &Version) -> bool {
        let bound = self.bound.to_version();
        let ord = version.precedence_cmp(&bound);

        match self.op {
            Op::Eq => ord == Ordering::Equal,
            Op::Gt => ord == Ordering::Greater,
            Op::Ge => ord != Ordering::Less,
            Op::Lt => ord == Ordering::Less,
            Op::Le => ord != Ordering::Greater,
            Op::Pessimistic => {
                if ord == Ordering::Less || version.major != bound.major {
                    return false;
                }
                // A patch-level bound also locks the minor component
                self.bound.patch.is_none() || version.minor == bound.minor
            },
        }
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.op.symbol(), self.bound)
    }
}

impl FromStr for Constraint {
    type Err = ConstraintError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Constraint::parse(s)
    }
}

impl Serialize for Constraint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Constraint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Constraint::parse(&raw).map_err(serde::de::Error::custom)
    }
}

impl ConstraintSet {
    /// Create an empty set, satisfied by every version
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a set holding a single constraint
    pub fn single(constraint: Constraint) -> Self {
        let mut set = Self::new();
        set.push(constraint);
        set
    }

    /// Parse a comma-separated constraint list such as `>= 1.0, < 2.0`
    pub fn parse(input: &str) -> Result<Self, ConstraintError> {
        let mut set = Self::new();
        for part in input.split(',') {
            set.push(Constraint::parse(part)?);
        }
        Ok(set)
    }

    /// Add a constraint, ignoring duplicates and trivial `>= 0` entries
    pub fn push(&mut self, constraint: Constraint) {
        if constraint.is_any() || self.constraints.contains(&constraint) {
            return;
        }
        self.constraints.push(constraint);
    }

    /// Combine two sets; the result admits versions both admit
    pub fn intersect(&self, other: &ConstraintSet) -> ConstraintSet {
        let mut merged = self.clone();
        for constraint in &other.constraints {
            merged.push(constraint.clone());
        }
        merged
    }

    /// Check whether a version satisfies every constraint
    pub fn satisfied_by(&self, version: &Version) -> bool {
        self.constraints.iter().all(|c| c.satisfied_by(version))
    }

    /// Find two exact constraints that cannot both hold
    pub fn exact_conflict(&self) -> Option<(&Constraint, &Constraint)> {
        let exact: Vec<&Constraint> = self.constraints.iter().filter(|c| c.is_exact()).collect();
        for (i, a) in exact.iter().enumerate() {
            for b in &exact[i + 1..] {
                if a.bound.to_version().precedence_cmp(&b.bound.to_version()) != Ordering::Equal {
                    return Some((a, b));
                }
            }
        }
        None
    }

    pub fn iter(&self) -> impl Iterator<Item = &Constraint> {
        self.constraints.iter()
    }

    pub fn len(&self) -> usize {
        self.constraints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    /// Canonical constraint strings, sorted
    pub fn sorted_strings(&self) -> Vec<String> {
        let mut items: Vec<String> = self.constraints.iter().map(|c| c.to_string()).collect();
        items.sort();
        items
    }
}

impl From<Constraint> for ConstraintSet {
    fn from(constraint: Constraint) -> Self {
        ConstraintSet::single(constraint)
    }
}

impl FromIterator<Constraint> for ConstraintSet {
    fn from_iter<I: IntoIterator<Item = Constraint>>(iter: I) -> Self {
        let mut set = ConstraintSet::new();
        for constraint in iter {
            set.push(constraint);
        }
        set
    }
}

impl fmt::Display for ConstraintSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.constraints.is_empty() {
            return write!(f, "{}", Constraint::any());
        }
        let parts: Vec<String> = self.constraints.iter().map(|c| c.to_string()).collect();
        write!(f, "{}", parts.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        Version::from_str(s).unwrap()
    }

    #[test]
    fn test_parse_operators() {
        assert_eq!(Constraint::parse("~> 2.1").unwrap().op, Op::Pessimistic);
        assert_eq!(Constraint::parse(">= 1.0").unwrap().op, Op::Ge);
        assert_eq!(Constraint::parse("<=1.0").unwrap().op, Op::Le);
        assert_eq!(Constraint::parse("> 1.0").unwrap().op, Op::Gt);
        assert_eq!(Constraint::parse("< 1.0").unwrap().op, Op::Lt);
        assert_eq!(Constraint::parse("= 1.0").unwrap().op, Op::Eq);
        assert_eq!(Constraint::parse("1.0.1").unwrap().op, Op::Eq);
    }

    #[test]
    fn test_parse_any() {
        assert!(Constraint::parse("").unwrap().is_any());
        assert!(Constraint::parse("*").unwrap().is_any());
        assert!(Constraint::parse(">= 0.0.0").unwrap().is_any());
    }

    #[test]
    fn test_parse_errors() {
        assert!(Constraint::parse("~>").is_err());
        assert!(Constraint::parse(">= banana").is_err());
        assert!(Constraint::parse("= 1.2.3.4").is_err());
    }

    #[test]
    fn test_display_is_canonical() {
        assert_eq!(Constraint::parse("~>2.1").unwrap().to_string(), "~> 2.1");
        assert_eq!(Constraint::parse("1.0.0").unwrap().to_string(), "= 1.0.0");
    }

    #[test]
    fn test_pessimistic_minor_bound() {
        let c = Constraint::parse("~> 2.1").unwrap();
        assert!(!c.satisfied_by(&v("2.0.0")));
        assert!(c.satisfied_by(&v("2.1.0")));
        assert!(c.satisfied_by(&v("2.2.0")));
        assert!(c.satisfied_by(&v("2.9.9")));
        assert!(!c.satisfied_by(&v("3.0.0")));
    }

    #[test]
    fn test_pessimistic_patch_bound() {
        let c = Constraint::parse("~> 2.1.3").unwrap();
        assert!(!c.satisfied_by(&v("2.1.2")));
        assert!(c.satisfied_by(&v("2.1.3")));
        assert!(c.satisfied_by(&v("2.1.9")));
        assert!(!c.satisfied_by(&v("2.2.0")));
    }

    #[test]
    fn test_pessimistic_major_bound() {
        let c = Constraint::parse("~> 2").unwrap();
        assert!(c.satisfied_by(&v("2.0.0")));
        assert!(c.satisfied_by(&v("2.7.1")));
        assert!(!c.satisfied_by(&v("3.0.0")));
        assert!(!c.satisfied_by(&v("1.9.0")));
    }

    #[test]
    fn test_exact_matches_two_component_bound() {
        let c = Constraint::parse("= 1.0").unwrap();
        assert!(c.satisfied_by(&v("1.0.0")));
        assert!(!c.satisfied_by(&v("1.0.1")));
    }

    #[test]
    fn test_constraint_set_intersection() {
        let a = ConstraintSet::parse(">= 1.0").unwrap();
        let b = ConstraintSet::parse("< 2.0").unwrap();
        let both = a.intersect(&b);

        assert_eq!(both.len(), 2);
        assert!(both.satisfied_by(&v("1.5.0")));
        assert!(!both.satisfied_by(&v("2.0.0")));
        assert!(!both.satisfied_by(&v("0.9.0")));
    }

    #[test]
    fn test_constraint_set_dedupes() {
        let mut set = ConstraintSet::new();
        set.push(Constraint::parse("~> 1.0").unwrap());
        set.push(Constraint::parse("~>1.0").unwrap());
        set.push(Constraint::any());
        assert_eq!(set.len(), 1);
        assert_eq!(set.to_string(), "~> 1.0");
    }

    #[test]
    fn test_empty_set_display() {
        assert_eq!(ConstraintSet::new().to_string(), ">= 0.0.0");
    }

    #[test]
    fn test_exact_conflict() {
        let set = ConstraintSet::parse("= 1.0, = 1.1").unwrap();
        let (a, b) = set.exact_conflict().unwrap();
        assert_eq!(a.to_string(), "= 1.0");
        assert_eq!(b.to_string(), "= 1.1");

        let same = ConstraintSet::parse("= 1.0, = 1.0.0").unwrap();
        assert!(same.exact_conflict().is_none());
    }
}
