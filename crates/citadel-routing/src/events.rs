//! Routing events for presentation and monitoring.

use crate::NodeId;

/// Something observable happened in a routing domain.
///
/// Delivered over a `tokio::sync::broadcast` channel; slow subscribers lag
/// and miss events rather than blocking the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoutingEvent {
    /// A router joined the domain.
    RouterCreated {
        node: NodeId,
    },
    /// A router left the domain.
    RouterDestroyed {
        node: NodeId,
    },
    /// A router published a new LSA.
    LsaPublished {
        node: NodeId,
        version: u64,
    },
    /// A router's LSA was removed from the database.
    LsaWithdrawn {
        node: NodeId,
        version: u64,
    },
    /// A router applied freshly computed tables.
    RouteTableUpdated {
        node: NodeId,
        version: u64,
        destinations: usize,
    },
    /// A recomputation failed; the router keeps its previous tables.
    RecomputeFailed {
        node: NodeId,
        target_version: u64,
        reason: String,
    },
}

impl RoutingEvent {
    /// Router the event is about.
    pub fn node(&self) -> NodeId {
        match self {
            RoutingEvent::RouterCreated { node }
            | RoutingEvent::RouterDestroyed { node }
            | RoutingEvent::LsaPublished { node, .. }
            | RoutingEvent::LsaWithdrawn { node, .. }
            | RoutingEvent::RouteTableUpdated { node, .. }
            | RoutingEvent::RecomputeFailed { node, .. } => *node,
        }
    }
}
