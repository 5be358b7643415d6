//! Resolution failure diagnostics.
//!
//! When no consistent assignment exists the resolver reports, per package,
//! every constraint that was demanded of it and by whom.

use serde::Serialize;
use std::fmt;

use super::constraint::Constraint;
use super::package::PackageIdentity;
use super::version::Version;

/// Who imposed a constraint
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Dependent {
    Root,
    Package(PackageIdentity),
}

/// A single constraint together with the dependent that imposed it
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Demand {
    pub dependent: Dependent,
    pub constraint: Constraint,
}

/// Why one package could not be given a version
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnsatisfiableConstraint {
    pub package: String,
    pub demands: Vec<Demand>,
    pub available: Vec<Version>,
    pub reason: String,
}

/// Everything the resolver learned before giving up
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FailureReport {
    pub conflicts: Vec<UnsatisfiableConstraint>,
}

impl fmt::Display for Dependent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dependent::Root => f.write_str("root"),
            Dependent::Package(id) => write!(f, "{}", id),
        }
    }
}

impl Demand {
    pub fn new(dependent: Dependent, constraint: Constraint) -> Self {
        Self { dependent, constraint }
    }
}

impl fmt::Display for Demand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} requires {}", self.dependent, self.constraint)
    }
}

impl fmt::Display for UnsatisfiableConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Unable to satisfy constraints on cookbook '{}': {}", self.package, self.reason)?;
        for demand in &self.demands {
            writeln!(f, "  - {} {}", demand.dependent, demand.constraint)?;
        }
        if self.available.is_empty() {
            write!(f, "  available versions: none")
        } else {
            let versions: Vec<String> = self.available.iter().map(|v| v.to_string()).collect();
            write!(f, "  available versions: {}", versions.join(", "))
        }
    }
}

impl FailureReport {
    pub fn is_empty(&self) -> bool {
        self.conflicts.is_empty()
    }

    /// Record a conflict, replacing an earlier one for the same package
    pub fn record(&mut self, conflict: UnsatisfiableConstraint) {
        self.conflicts.retain(|c| c.package != conflict.package);
        self.conflicts.push(conflict);
    }
}

impl fmt::Display for FailureReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, conflict) in self.conflicts.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", conflict)?;
        }
        Ok(())
    }
}
