//! Direct-adjacency change detection.
//!
//! A router keeps the last adjacency it advertised. Each recheck compares a
//! fresh probe against it and only reports a change (and so only causes a
//! publish and a domain-wide version bump) when something observable moved:
//! a neighbor appeared or vanished, an exit changed direction, cost or
//! blocking flag, or the attached providers changed.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use crate::topology::{ProbedNeighbor, Topology};
use crate::{Direction, ExitRoute, LinkStateAdvertisement, Locator, NodeId, ProviderId};

/// Outcome of one adjacency recheck.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdjacencyChange {
    /// Nothing observable changed; nothing must be published.
    Unchanged,
    /// The snapshot was replaced; a new LSA must be published.
    Changed,
    /// A probed neighbor is mid-replacement; cycle aborted, retry later.
    Unsettled,
    /// The router's own locator did not resolve; cycle aborted.
    Unresolved,
}

/// Per-router cache of the last advertised adjacency.
#[derive(Debug, Clone, Default)]
pub struct AdjacencyTracker {
    adjacency: Arc<HashMap<NodeId, ExitRoute>>,
    providers: Arc<BTreeSet<ProviderId>>,
}

impl AdjacencyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Probe `topology` at `locator` and fold the result in.
    pub fn recheck(&mut self, topology: &dyn Topology, locator: &Locator) -> AdjacencyChange {
        let probed = topology.probe_adjacency(locator);
        let providers = topology.probe_capability_providers(locator);
        self.observe(probed, providers)
    }

    /// Fold a probe result in, replacing the snapshot if it differs.
    pub fn observe(
        &mut self,
        probed: Option<HashMap<NodeId, ProbedNeighbor>>,
        providers: BTreeSet<ProviderId>,
    ) -> AdjacencyChange {
        let Some(probed) = probed else {
            return AdjacencyChange::Unresolved;
        };
        if probed.values().any(|n| !n.settled) {
            return AdjacencyChange::Unsettled;
        }

        let adjacency: HashMap<NodeId, ExitRoute> =
            probed.into_iter().map(|(id, n)| (id, n.exit)).collect();

        // ExitRoute equality covers direction, cost and blocking flag.
        if *self.adjacency == adjacency && *self.providers == providers {
            return AdjacencyChange::Unchanged;
        }

        self.adjacency = Arc::new(adjacency);
        self.providers = Arc::new(providers);
        AdjacencyChange::Changed
    }

    /// Drop `node` from the snapshot, as if a probe no longer saw it.
    /// Returns `true` if it was adjacent.
    pub fn forget(&mut self, node: &NodeId) -> bool {
        if !self.adjacency.contains_key(node) {
            return false;
        }
        Arc::make_mut(&mut self.adjacency).remove(node);
        true
    }

    /// The LSA describing the current snapshot.
    pub fn advertisement(&self) -> LinkStateAdvertisement {
        LinkStateAdvertisement::from_adjacency(&self.adjacency, &self.providers)
    }

    /// Current adjacency snapshot.
    pub fn adjacency(&self) -> Arc<HashMap<NodeId, ExitRoute>> {
        Arc::clone(&self.adjacency)
    }

    /// Current attached-provider snapshot.
    pub fn providers(&self) -> Arc<BTreeSet<ProviderId>> {
        Arc::clone(&self.providers)
    }

    /// Whether some adjacency entry leaves through `direction`.
    pub fn is_routed_exit(&self, direction: Direction) -> bool {
        self.adjacency.values().any(|e| e.direction == direction)
    }

    /// Planar and vertical exits no adjacency entry uses.
    pub fn non_routed_exits(&self) -> Vec<Direction> {
        Direction::ORTHOGONAL
            .into_iter()
            .filter(|d| !self.is_routed_exit(*d))
            .collect()
    }
}
