//! Topology collaborator interface.
//!
//! The routing engine does not discover links itself. A [`Topology`]
//! resolves a router's [`Locator`] and reports which routers are directly
//! reachable from it, through which exit and at what cost.
//!
//! [`StaticTopology`] is an in-memory implementation for simulations,
//! embedding hosts without a world model, and tests.

use std::collections::{BTreeSet, HashMap};

use parking_lot::RwLock;

use crate::{Direction, ExitRoute, Locator, NodeId, ProviderId};

/// One adjacent router as seen by a topology probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbedNeighbor {
    /// How the probed router reaches this neighbor
    pub exit: ExitRoute,
    /// `false` while the neighbor is being replaced and its links are not
    /// final
    pub settled: bool,
}

/// Source of adjacency information for routers.
pub trait Topology: Send + Sync {
    /// Directly adjacent routers of the router at `locator`.
    ///
    /// `None` when the locator cannot currently be resolved.
    fn probe_adjacency(&self, locator: &Locator) -> Option<HashMap<NodeId, ProbedNeighbor>>;

    /// Capability providers attached to the router at `locator`.
    fn probe_capability_providers(&self, locator: &Locator) -> BTreeSet<ProviderId>;
}

#[derive(Debug, Clone)]
struct Cell {
    node: NodeId,
    settled: bool,
    providers: BTreeSet<ProviderId>,
}

#[derive(Debug, Default)]
struct Wiring {
    cells: HashMap<Locator, Cell>,
    // Directed: links[from][to] is the exit `from` uses to reach `to`.
    links: HashMap<Locator, HashMap<Locator, ExitRoute>>,
}

/// Mutable in-memory topology.
///
/// Cells hold one router each; links are stored per direction so asymmetric
/// costs can be modelled, but [`StaticTopology::link`] creates both halves.
#[derive(Debug, Default)]
pub struct StaticTopology {
    wiring: RwLock<Wiring>,
}

impl StaticTopology {
    pub fn new() -> Self {
        Self::default()
    }

    /// Place a router at `locator`, replacing any previous occupant.
    pub fn place(&self, locator: Locator, node: NodeId) {
        self.wiring.write().cells.insert(
            locator,
            Cell {
                node,
                settled: true,
                providers: BTreeSet::new(),
            },
        );
    }

    /// Remove the router at `locator` together with every link touching it.
    pub fn remove(&self, locator: &Locator) -> Option<NodeId> {
        let mut wiring = self.wiring.write();
        let cell = wiring.cells.remove(locator)?;
        wiring.links.remove(locator);
        for targets in wiring.links.values_mut() {
            targets.remove(locator);
        }
        Some(cell.node)
    }

    /// Link two adjacent cells in both directions.
    ///
    /// Returns `false` (and links nothing) when the cells are not adjacent.
    pub fn link(&self, a: Locator, b: Locator, cost: u32, blocks_capability: bool) -> bool {
        let (Some(ab), Some(ba)) = (a.direction_to(&b), b.direction_to(&a)) else {
            return false;
        };
        self.connect(a, b, ExitRoute::new(ab, cost, blocks_capability));
        self.connect(b, a, ExitRoute::new(ba, cost, blocks_capability));
        true
    }

    /// Add one directed link from `from` to `to` leaving through `exit`.
    ///
    /// The cells need not be adjacent (a long passive run between two
    /// routers still leaves through one exit).
    pub fn connect(&self, from: Locator, to: Locator, exit: ExitRoute) {
        self.wiring
            .write()
            .links
            .entry(from)
            .or_default()
            .insert(to, exit);
    }

    /// Remove both halves of the link between `a` and `b`.
    pub fn unlink(&self, a: &Locator, b: &Locator) {
        let mut wiring = self.wiring.write();
        if let Some(targets) = wiring.links.get_mut(a) {
            targets.remove(b);
        }
        if let Some(targets) = wiring.links.get_mut(b) {
            targets.remove(a);
        }
    }

    /// Mark the router at `locator` as mid-replacement (or settled again).
    pub fn set_settled(&self, locator: &Locator, settled: bool) {
        if let Some(cell) = self.wiring.write().cells.get_mut(locator) {
            cell.settled = settled;
        }
    }

    /// Attach a capability provider to the router at `locator`.
    pub fn attach_provider(&self, locator: &Locator, provider: ProviderId) {
        if let Some(cell) = self.wiring.write().cells.get_mut(locator) {
            cell.providers.insert(provider);
        }
    }

    pub fn detach_provider(&self, locator: &Locator, provider: &ProviderId) {
        if let Some(cell) = self.wiring.write().cells.get_mut(locator) {
            cell.providers.remove(provider);
        }
    }

    /// Directions in use from `locator`.
    pub fn exits_of(&self, locator: &Locator) -> Vec<Direction> {
        self.wiring
            .read()
            .links
            .get(locator)
            .map(|targets| targets.values().map(|e| e.direction).collect())
            .unwrap_or_default()
    }
}

impl Topology for StaticTopology {
    fn probe_adjacency(&self, locator: &Locator) -> Option<HashMap<NodeId, ProbedNeighbor>> {
        let wiring = self.wiring.read();
        wiring.cells.get(locator)?;

        let adjacent = wiring
            .links
            .get(locator)
            .map(|targets| {
                targets
                    .iter()
                    .filter_map(|(to, exit)| {
                        wiring.cells.get(to).map(|cell| {
                            (
                                cell.node,
                                ProbedNeighbor {
                                    exit: *exit,
                                    settled: cell.settled,
                                },
                            )
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();
        Some(adjacent)
    }

    fn probe_capability_providers(&self, locator: &Locator) -> BTreeSet<ProviderId> {
        self.wiring
            .read()
            .cells
            .get(locator)
            .map(|c| c.providers.clone())
            .unwrap_or_default()
    }
}
