//! Backtracking dependency resolution
//!
//! The search keeps one node per cookbook name. Each step picks the open
//! node with the fewest remaining candidates (ties go to the node discovered
//! first), tries its highest remaining version, and merges that version's
//! dependencies into the graph. Every decision saves the state it was made
//! from, minus the version being tried, so backtracking is a pop.
//!
//! A candidate whose fetch fails, or whose dependencies contradict an
//! already selected version, is rejected exactly like one that violates a
//! constraint. Two exact requirements that cannot both hold end the search
//! immediately once no earlier decision is left to revisit; until then they
//! only reject the candidate that introduced them.

use indexmap::IndexMap;
use serde::Serialize;
use shelf_config::ResolverSection;
use shelf_core::error::ShelfError;
use shelf_core::types::{
    CachedPackage, Constraint, ConstraintSet, Demand, Dependency, Dependent, FailureReport, UnsatisfiableConstraint,
    Version,
};
use shelf_location::{DefaultLocationProvider, Location, LocationProvider, ShelfContext};
use shelf_lockfile::{LockEntry, Lockfile};
use shelf_store::CookbookStore;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use crate::candidates::CandidateQueue;
use crate::fetch::Fetcher;
use crate::graph::{ResolutionGraph, ResolvedCookbook};
use crate::ResolverResult;

/// Resolver tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolverOptions {
    /// Upper bound on concurrent listings and fetches
    pub max_concurrent_fetches: usize,
    /// Fetch the best candidate of newly discovered cookbooks ahead of time
    pub prefetch: bool,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self::from(&ResolverSection::default())
    }
}

impl From<&ResolverSection> for ResolverOptions {
    fn from(section: &ResolverSection) -> Self {
        Self {
            max_concurrent_fetches: section.max_concurrent_fetches.max(1),
            prefetch: section.prefetch,
        }
    }
}

/// Counters for one resolution
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResolutionStats {
    /// Versions tentatively selected
    pub decisions: usize,
    /// Decisions undone
    pub backtracks: usize,
    /// Distinct cookbooks obtained from a location or the store
    pub fetched: usize,
    pub elapsed_ms: u64,
}

/// A satisfied resolution
#[derive(Debug, Clone)]
pub struct Resolution {
    /// Selected versions in lock order
    pub entries: Vec<LockEntry>,
    pub graph: ResolutionGraph,
    pub packages: BTreeMap<String, CachedPackage>,
    pub stats: ResolutionStats,
}

impl Resolution {
    /// Lock this resolution as the outcome of `roots`
    pub fn lockfile(&self, roots: &[Dependency]) -> Lockfile {
        Lockfile::new(roots, self.entries.clone())
    }

    pub fn version_of(&self, name: &str) -> Option<&Version> {
        self.packages.get(name).map(|package| package.version())
    }
}

/// Cookbook dependency resolver
pub struct Resolver {
    provider: Arc<dyn LocationProvider>,
    store: Arc<CookbookStore>,
    options: ResolverOptions,
}

impl Resolver {
    pub fn new(provider: Arc<dyn LocationProvider>, store: Arc<CookbookStore>, options: ResolverOptions) -> Self {
        Self {
            provider,
            store,
            options,
        }
    }

    /// Resolver over the real locations of `ctx`
    pub fn from_context(ctx: ShelfContext) -> Self {
        let options = ResolverOptions::from(&ctx.config.resolver);
        let store = ctx.store.clone();
        Self::new(Arc::new(DefaultLocationProvider::new(ctx)), store, options)
    }

    pub fn options(&self) -> &ResolverOptions {
        &self.options
    }

    pub(crate) fn provider(&self) -> &dyn LocationProvider {
        self.provider.as_ref()
    }

    pub(crate) fn fetcher(&self) -> Fetcher {
        Fetcher::new(self.store.clone(), self.options.max_concurrent_fetches)
    }

    /// Find one version per cookbook satisfying every constraint
    #[instrument(skip_all, fields(roots = roots.len()))]
    pub async fn resolve(&self, roots: &[Dependency], cancel: &CancellationToken) -> ResolverResult<Resolution> {
        let started = Instant::now();
        let fetcher = self.fetcher();
        let mut search = Search {
            provider: self.provider.as_ref(),
            fetcher: &fetcher,
            options: self.options,
            cancel,
            default_location: self.provider.location_for(None)?,
            report: FailureReport::default(),
            stats: ResolutionStats::default(),
        };

        let outcome = search.run(roots).await;
        let mut stats = search.stats;
        stats.fetched = fetcher.fetched();
        stats.elapsed_ms = started.elapsed().as_millis() as u64;

        let state = match outcome {
            Ok(state) => state,
            Err(e) => {
                info!(
                    decisions = stats.decisions,
                    backtracks = stats.backtracks,
                    elapsed_ms = stats.elapsed_ms,
                    error = %e,
                    "resolution failed"
                );
                return Err(e);
            },
        };

        let resolution = state.into_resolution(stats);
        info!(
            cookbooks = resolution.entries.len(),
            decisions = resolution.stats.decisions,
            backtracks = resolution.stats.backtracks,
            elapsed_ms = resolution.stats.elapsed_ms,
            "resolution satisfied"
        );
        Ok(resolution)
    }
}

/// One cookbook name in the search
#[derive(Clone)]
struct Node {
    location: Arc<dyn Location>,
    demands: Vec<Demand>,
    constraints: ConstraintSet,
    queue: CandidateQueue,
    /// Why the location could not list the cookbook
    unavailable: Option<String>,
    selected: Option<CachedPackage>,
}

impl Node {
    fn new(location: Arc<dyn Location>) -> Self {
        Self {
            location,
            demands: Vec::new(),
            constraints: ConstraintSet::new(),
            queue: CandidateQueue::default(),
            unavailable: None,
            selected: None,
        }
    }

    fn demand(&mut self, dependent: Dependent, constraint: Constraint) {
        self.queue.narrow(&constraint);
        self.constraints.push(constraint.clone());
        self.demands.push(Demand::new(dependent, constraint));
    }

    /// Demands behind two exact requirements that cannot both hold
    fn exact_conflict(&self) -> Option<Vec<Demand>> {
        let (a, b) = self.constraints.exact_conflict()?;
        let pinned = [a.bound.to_version(), b.bound.to_version()];
        Some(
            self.demands
                .iter()
                .filter(|demand| {
                    let bound = demand.constraint.bound.to_version();
                    demand.constraint.is_exact()
                        && pinned.iter().any(|version| bound.precedence_cmp(version) == Ordering::Equal)
                })
                .cloned()
                .collect(),
        )
    }

    fn check_exact(&self, name: &str) -> ResolverResult<()> {
        match self.exact_conflict() {
            Some(demands) => Err(ShelfError::ConstraintConflict {
                package: name.to_string(),
                demands,
            }),
            None => Ok(()),
        }
    }

    fn conflict(&self, name: &str, reason: String) -> UnsatisfiableConstraint {
        UnsatisfiableConstraint {
            package: name.to_string(),
            demands: self.demands.clone(),
            available: self.queue.available().to_vec(),
            reason,
        }
    }
}

/// Graph state at one point of the search
#[derive(Clone, Default)]
struct SearchState {
    /// In discovery order
    nodes: IndexMap<String, Node>,
}

impl SearchState {
    /// Open node with the fewest remaining candidates
    fn most_constrained(&self) -> Option<String> {
        self.nodes
            .iter()
            .filter(|(_, node)| node.selected.is_none())
            .min_by_key(|(_, node)| node.queue.len())
            .map(|(name, _)| name.clone())
    }

    /// Some open node has nothing left to try, so this state can only fail
    fn is_dead(&self) -> bool {
        self.nodes
            .values()
            .any(|node| node.selected.is_none() && node.queue.is_empty())
    }

    fn into_resolution(self, stats: ResolutionStats) -> Resolution {
        let mut graph = ResolutionGraph::new();
        let mut packages = BTreeMap::new();

        for (name, node) in &self.nodes {
            if let Some(package) = &node.selected {
                graph.add_cookbook(ResolvedCookbook::new(
                    name.clone(),
                    package.version().clone(),
                    node.location.spec().redacted(),
                ));
                packages.insert(name.clone(), package.clone());
            }
        }
        for (name, node) in &self.nodes {
            for demand in &node.demands {
                if let Dependent::Package(from) = &demand.dependent {
                    graph.add_dependency(&from.name, name, demand.constraint.clone());
                }
            }
        }

        Resolution {
            entries: graph.lock_entries(),
            graph,
            packages,
            stats,
        }
    }
}

enum Step {
    Expanded,
    Rejected(UnsatisfiableConstraint),
}

struct Search<'a> {
    provider: &'a dyn LocationProvider,
    fetcher: &'a Fetcher,
    options: ResolverOptions,
    cancel: &'a CancellationToken,
    default_location: Arc<dyn Location>,
    report: FailureReport,
    stats: ResolutionStats,
}

impl Search<'_> {
    async fn run(&mut self, roots: &[Dependency]) -> ResolverResult<SearchState> {
        self.checkpoint()?;
        let mut state = self.seed(roots).await?;
        let mut trail: Vec<SearchState> = Vec::new();

        loop {
            self.checkpoint()?;

            let Some(name) = state.most_constrained() else {
                return Ok(state);
            };

            let node = &state.nodes[&name];
            let Some(version) = node.queue.best().cloned() else {
                let conflict = self.exhausted(&name, node);
                debug!(cookbook = %name, reason = %conflict.reason, "no candidates left");
                self.report.record(conflict);
                state = self.backtrack(&mut trail)?;
                continue;
            };

            let mut alternative = state.clone();
            if let Some(node) = alternative.nodes.get_mut(&name) {
                node.queue.discard(&version);
            }
            trail.push(alternative);
            self.stats.decisions += 1;
            debug!(cookbook = %name, version = %version, depth = trail.len(), "trying");

            if let Step::Rejected(conflict) = self.expand(&mut state, &name, &version, &trail).await? {
                debug!(cookbook = %name, version = %version, reason = %conflict.reason, "rejected");
                self.report.record(conflict);
                state = self.backtrack(&mut trail)?;
            }
        }
    }

    fn checkpoint(&self) -> ResolverResult<()> {
        if self.cancel.is_cancelled() {
            return Err(ShelfError::Cancelled);
        }
        Ok(())
    }

    fn backtrack(&mut self, trail: &mut Vec<SearchState>) -> ResolverResult<SearchState> {
        match trail.pop() {
            Some(previous) => {
                self.stats.backtracks += 1;
                Ok(previous)
            },
            None => Err(ShelfError::ResolutionFailed {
                report: std::mem::take(&mut self.report),
            }),
        }
    }

    /// Merge the roots into an empty graph and list their versions
    async fn seed(&mut self, roots: &[Dependency]) -> ResolverResult<SearchState> {
        let mut state = SearchState::default();
        let mut names = Vec::new();

        for root in roots {
            if !state.nodes.contains_key(&root.name) {
                let location = self.provider.location_for(root.location.as_ref())?;
                state.nodes.insert(root.name.clone(), Node::new(location));
                names.push(root.name.clone());
            }
            if let Some(node) = state.nodes.get_mut(&root.name) {
                if root.constraints.is_empty() {
                    node.demand(Dependent::Root, Constraint::any());
                }
                for constraint in root.constraints.iter() {
                    node.demand(Dependent::Root, constraint.clone());
                }
                node.check_exact(&root.name)?;
            }
        }

        self.list(&mut state, &names).await?;
        self.prefetch(&state, &names).await;
        Ok(state)
    }

    /// Select `version` for `name` and merge its dependencies
    ///
    /// `trail` holds the alternatives still open, this decision's included.
    async fn expand(
        &mut self,
        state: &mut SearchState,
        name: &str,
        version: &Version,
        trail: &[SearchState],
    ) -> ResolverResult<Step> {
        let Some(node) = state.nodes.get_mut(name) else {
            return Ok(Step::Expanded);
        };

        let package = match self.fetcher.package(node.location.as_ref(), name, version).await {
            Ok(package) => package,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                return Ok(Step::Rejected(node.conflict(name, format!("{} {} is unusable: {}", name, version, e))));
            },
        };
        node.selected = Some(package.clone());

        let identity = package.identity.clone();
        let mut discovered = Vec::new();
        for (dep_name, constraint) in &package.metadata.dependencies {
            let dependent = Dependent::Package(identity.clone());
            match state.nodes.get_mut(dep_name) {
                Some(existing) => {
                    existing.demand(dependent, constraint.clone());
                    if let Some(demands) = existing.exact_conflict() {
                        if trail.iter().all(SearchState::is_dead) {
                            return Err(ShelfError::ConstraintConflict {
                                package: dep_name.clone(),
                                demands,
                            });
                        }
                        let reason = format!(
                            "{} requires {} {} against another exact requirement",
                            identity, dep_name, constraint
                        );
                        return Ok(Step::Rejected(existing.conflict(dep_name, reason)));
                    }

                    if let Some(selected) = &existing.selected {
                        if !constraint.satisfied_by(selected.version()) {
                            let reason = format!(
                                "{} requires {} {} but {} is selected",
                                identity,
                                dep_name,
                                constraint,
                                selected.version()
                            );
                            return Ok(Step::Rejected(existing.conflict(dep_name, reason)));
                        }
                    }
                },
                None => {
                    let mut node = Node::new(self.default_location.clone());
                    node.demand(dependent, constraint.clone());
                    state.nodes.insert(dep_name.clone(), node);
                    discovered.push(dep_name.clone());
                },
            }
        }

        self.list(state, &discovered).await?;
        self.prefetch(state, &discovered).await;
        Ok(Step::Expanded)
    }

    /// List versions for freshly added nodes, concurrently
    async fn list(&mut self, state: &mut SearchState, names: &[String]) -> ResolverResult<()> {
        let requests: Vec<(Arc<dyn Location>, String)> = names
            .iter()
            .filter_map(|name| state.nodes.get(name).map(|node| (node.location.clone(), name.clone())))
            .collect();
        let results = self.fetcher.versions_all(&requests).await;

        for ((_, name), result) in requests.iter().zip(results) {
            let Some(node) = state.nodes.get_mut(name) else {
                continue;
            };
            match result {
                Ok(listed) => node.queue = CandidateQueue::new(listed, &node.constraints),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    debug!(cookbook = %name, error = %e, "cannot list versions");
                    node.unavailable = Some(e.to_string());
                },
            }
        }
        Ok(())
    }

    async fn prefetch(&self, state: &SearchState, names: &[String]) {
        if !self.options.prefetch {
            return;
        }
        let requests: Vec<(Arc<dyn Location>, String, Version)> = names
            .iter()
            .filter_map(|name| {
                let node = state.nodes.get(name)?;
                let best = node.queue.best()?;
                Some((node.location.clone(), name.clone(), best.clone()))
            })
            .collect();
        self.fetcher.prefetch(&requests).await;
    }

    fn exhausted(&self, name: &str, node: &Node) -> UnsatisfiableConstraint {
        let reason = match &node.unavailable {
            Some(message) => message.clone(),
            None if node.queue.available().is_empty() => "no versions available".to_string(),
            None => match node.queue.matching(&node.constraints) {
                0 => "no available version satisfies every constraint".to_string(),
                1 => "the only matching version was tried and rejected".to_string(),
                n => format!("all {} matching versions were tried and rejected", n),
            },
        };
        node.conflict(name, reason)
    }
}
