//! Link-state advertisements and the link descriptors they are built from.

use std::collections::{BTreeSet, HashMap};

use crate::{Direction, NodeId, ProviderId};

/// Cost and capability flag of one advertised link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LinkMetric {
    /// Non-negative link cost
    pub cost: u32,
    /// The link carries routing traffic but not capabilities
    pub blocks_capability: bool,
}

impl LinkMetric {
    pub const fn new(cost: u32, blocks_capability: bool) -> Self {
        Self { cost, blocks_capability }
    }
}

/// The physical egress a router uses to reach a directly adjacent router.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ExitRoute {
    /// Exit taken from the source cell
    pub direction: Direction,
    /// Link cost
    pub cost: u32,
    /// The link does not forward capabilities
    pub blocks_capability: bool,
}

impl ExitRoute {
    pub const fn new(direction: Direction, cost: u32, blocks_capability: bool) -> Self {
        Self {
            direction,
            cost,
            blocks_capability,
        }
    }

    /// The metric this exit is advertised with.
    pub const fn metric(&self) -> LinkMetric {
        LinkMetric::new(self.cost, self.blocks_capability)
    }
}

/// A router's published view of its direct links.
///
/// LSAs are immutable once published: the database stores them behind an
/// `Arc` and a router supersedes its LSA by publishing a new one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkStateAdvertisement {
    /// Direct neighbors with link metrics
    pub neighbors: HashMap<NodeId, LinkMetric>,
    /// Capability providers attached to the advertising router
    pub capabilities: BTreeSet<ProviderId>,
}

impl LinkStateAdvertisement {
    /// An advertisement with no links and no providers.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build an LSA from a router's adjacency and attached providers.
    pub fn from_adjacency(
        adjacency: &HashMap<NodeId, ExitRoute>,
        capabilities: &BTreeSet<ProviderId>,
    ) -> Self {
        Self {
            neighbors: adjacency
                .iter()
                .map(|(id, exit)| (*id, exit.metric()))
                .collect(),
            capabilities: capabilities.clone(),
        }
    }

    /// Add a link (builder style, mostly for tests and simulations).
    pub fn with_link(mut self, neighbor: NodeId, cost: u32, blocks_capability: bool) -> Self {
        self.neighbors
            .insert(neighbor, LinkMetric::new(cost, blocks_capability));
        self
    }

    /// Add a capability provider.
    pub fn with_capability(mut self, provider: ProviderId) -> Self {
        self.capabilities.insert(provider);
        self
    }

    /// Metric of the link towards `neighbor`.
    pub fn link(&self, neighbor: &NodeId) -> Option<LinkMetric> {
        self.neighbors.get(neighbor).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.neighbors.is_empty() && self.capabilities.is_empty()
    }
}
