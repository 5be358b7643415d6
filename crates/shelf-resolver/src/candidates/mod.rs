//! Candidate version queues
//!
//! A queue holds the versions still worth trying for one cookbook, highest
//! precedence first. Versions of equal precedence keep the order the
//! location declared them in.

use shelf_core::types::{Constraint, ConstraintSet, Version};

/// Order versions for the prefer-latest policy
pub fn order_versions(mut versions: Vec<Version>) -> Vec<Version> {
    // stable: equal precedence keeps declaration order
    versions.sort_by(|a, b| b.precedence_cmp(a));
    versions
}

/// Versions still eligible for one cookbook
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CandidateQueue {
    /// Everything the location offered, ordered
    available: Vec<Version>,
    /// Remaining candidates, a subsequence of `available`
    remaining: Vec<Version>,
}

impl CandidateQueue {
    /// Seed a queue from a location listing and the constraints known so far
    pub fn new(listed: Vec<Version>, constraints: &ConstraintSet) -> Self {
        let available = order_versions(listed);
        let remaining = available.iter().filter(|v| constraints.satisfied_by(v)).cloned().collect();
        Self { available, remaining }
    }

    /// Drop every remaining version `constraint` rules out
    pub fn narrow(&mut self, constraint: &Constraint) {
        self.remaining.retain(|v| constraint.satisfied_by(v));
    }

    /// Highest remaining version
    pub fn best(&self) -> Option<&Version> {
        self.remaining.first()
    }

    /// Remove one version, returning whether it was still queued
    pub fn discard(&mut self, version: &Version) -> bool {
        match self.remaining.iter().position(|v| v == version) {
            Some(index) => {
                self.remaining.remove(index);
                true
            },
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.remaining.len()
    }

    pub fn is_empty(&self) -> bool {
        self.remaining.is_empty()
    }

    pub fn available(&self) -> &[Version] {
        &self.available
    }

    /// Number of offered versions satisfying `constraints`, tried or not
    pub fn matching(&self, constraints: &ConstraintSet) -> usize {
        self.available.iter().filter(|v| constraints.satisfied_by(v)).count()
    }
}


#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;
    use std::cmp::Ordering;

    proptest! {
        #[test]
        fn queue_is_ordered_and_satisfying(
            raw in prop::collection::vec((0u64..4, 0u64..4, 0u64..4), 0..12),
            floor in 0u64..4,
        ) {
            let listed: Vec<Version> = raw.iter().map(|(a, b, c)| Version::new(*a, *b, *c)).collect();
            let constraints = ConstraintSet::parse(&format!(">= {}.0", floor)).unwrap();
            let queue = CandidateQueue::new(listed.clone(), &constraints);

            let mut remaining = Vec::new();
            let mut drained = queue.clone();
            while let Some(best) = drained.best().cloned() {
                prop_assert!(constraints.satisfied_by(&best));
                drained.discard(&best);
                remaining.push(best);
            }

            for pair in remaining.windows(2) {
                prop_assert!(pair[0].precedence_cmp(&pair[1]) != Ordering::Less);
            }
            prop_assert_eq!(remaining.len(), listed.iter().filter(|v| constraints.satisfied_by(v)).count());
        }
    }
}
