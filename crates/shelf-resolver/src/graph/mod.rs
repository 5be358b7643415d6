//! Resolved dependency graph using petgraph
//!
//! Nodes are the selected cookbooks, edges point from a dependent to the
//! cookbook it depends on and carry the constraint it imposed. Cycles are
//! allowed; lock order is computed over strongly connected components.

use petgraph::algo::{condensation, is_cyclic_directed};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use serde::Serialize;
use shelf_core::types::{Constraint, LocationSpec, PackageIdentity, Version};
use shelf_lockfile::LockEntry;
use std::collections::{BTreeSet, HashMap};

/// Strongly connected components of the graph, as node lists
type Condensed = DiGraph<Vec<NodeIndex>, ()>;

/// A cookbook bound to one version
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedCookbook {
    pub name: String,
    pub version: Version,
    /// Location the cookbook was obtained from
    pub source: LocationSpec,
}

impl ResolvedCookbook {
    pub fn new(name: impl Into<String>, version: Version, source: LocationSpec) -> Self {
        Self {
            name: name.into(),
            version,
            source,
        }
    }

    pub fn identity(&self) -> PackageIdentity {
        PackageIdentity::new(self.name.clone(), self.version.clone())
    }
}

/// Selected cookbooks and the constraints between them
#[derive(Debug, Clone, Default)]
pub struct ResolutionGraph {
    graph: DiGraph<ResolvedCookbook, Constraint>,
    index: HashMap<String, NodeIndex>,
}

impl ResolutionGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a cookbook, returning the existing node when the name is known
    pub fn add_cookbook(&mut self, cookbook: ResolvedCookbook) -> NodeIndex {
        if let Some(existing) = self.index.get(&cookbook.name) {
            return *existing;
        }
        let name = cookbook.name.clone();
        let node = self.graph.add_node(cookbook);
        self.index.insert(name, node);
        node
    }

    /// Record that `from` depends on `to`; false when either is unknown
    pub fn add_dependency(&mut self, from: &str, to: &str, constraint: Constraint) -> bool {
        match (self.index.get(from), self.index.get(to)) {
            (Some(from), Some(to)) => {
                self.graph.add_edge(*from, *to, constraint);
                true
            },
            _ => false,
        }
    }

    pub fn get(&self, name: &str) -> Option<&ResolvedCookbook> {
        self.index.get(name).and_then(|node| self.graph.node_weight(*node))
    }

    pub fn cookbooks(&self) -> impl Iterator<Item = &ResolvedCookbook> {
        self.graph.node_weights()
    }

    /// Names `name` depends on, sorted
    pub fn dependencies_of(&self, name: &str) -> Vec<&str> {
        self.neighbours(name, Direction::Outgoing)
    }

    /// Names depending on `name`, sorted
    pub fn dependents_of(&self, name: &str) -> Vec<&str> {
        self.neighbours(name, Direction::Incoming)
    }

    fn neighbours(&self, name: &str, direction: Direction) -> Vec<&str> {
        let Some(node) = self.index.get(name) else {
            return Vec::new();
        };
        let names: BTreeSet<&str> = self
            .graph
            .edges_directed(*node, direction)
            .map(|edge| match direction {
                Direction::Outgoing => edge.target(),
                Direction::Incoming => edge.source(),
            })
            .filter_map(|other| self.graph.node_weight(other))
            .map(|cookbook| cookbook.name.as_str())
            .collect();
        names.into_iter().collect()
    }

    /// Constraints imposed on `name` by other cookbooks
    pub fn constraints_on(&self, name: &str) -> Vec<(&str, &Constraint)> {
        let Some(node) = self.index.get(name) else {
            return Vec::new();
        };
        self.graph
            .edges_directed(*node, Direction::Incoming)
            .filter_map(|edge| {
                self.graph
                    .node_weight(edge.source())
                    .map(|source| (source.name.as_str(), edge.weight()))
            })
            .collect()
    }

    pub fn cookbook_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn dependency_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn has_cycles(&self) -> bool {
        is_cyclic_directed(&self.graph)
    }

    /// Dependents before dependencies, alphabetical among peers
    ///
    /// Each strongly connected component is emitted as a block in name order.
    /// Among components whose dependents are all emitted, the one holding the
    /// alphabetically smallest name goes next.
    pub fn lock_order(&self) -> Vec<&ResolvedCookbook> {
        let components = condensation(self.graph.map(|index, _| index, |_, _| ()), true);

        let mut in_degree: Vec<usize> = components
            .node_indices()
            .map(|c| components.neighbors_directed(c, Direction::Incoming).count())
            .collect();

        let mut ready: BTreeSet<(String, NodeIndex)> = components
            .node_indices()
            .filter(|c| in_degree[c.index()] == 0)
            .map(|c| (self.first_name(&components, c), c))
            .collect();

        let mut ordered = Vec::with_capacity(self.graph.node_count());
        while let Some(next) = ready.pop_first() {
            let component = next.1;
            ordered.extend(self.members(&components, component));
            for successor in components.neighbors_directed(component, Direction::Outgoing) {
                let degree = &mut in_degree[successor.index()];
                *degree -= 1;
                if *degree == 0 {
                    ready.insert((self.first_name(&components, successor), successor));
                }
            }
        }
        ordered
    }

    fn members(&self, components: &Condensed, component: NodeIndex) -> Vec<&ResolvedCookbook> {
        let mut cookbooks: Vec<&ResolvedCookbook> = components[component]
            .iter()
            .filter_map(|node| self.graph.node_weight(*node))
            .collect();
        cookbooks.sort_by(|a, b| a.name.cmp(&b.name));
        cookbooks
    }

    fn first_name(&self, components: &Condensed, component: NodeIndex) -> String {
        self.members(components, component)
            .first()
            .map(|cookbook| cookbook.name.clone())
            .unwrap_or_default()
    }

    /// Lock entries in lock order
    pub fn lock_entries(&self) -> Vec<LockEntry> {
        self.lock_order()
            .into_iter()
            .map(|cookbook| LockEntry::new(cookbook.name.clone(), cookbook.version.clone(), &cookbook.source))
            .collect()
    }
}
