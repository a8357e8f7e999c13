//! Error types for citadel-routing.

use thiserror::Error;

use crate::NodeId;

/// Result type for routing operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur inside the routing engine.
///
/// None of these reach callers of the read accessors on [`crate::Router`];
/// a failed recomputation leaves the last good tables in place.
#[derive(Debug, Error)]
pub enum Error {
    /// The shortest-path tree referenced a parent that was never approved.
    #[error("inconsistent shortest-path tree: parent of {node} was never approved")]
    InconsistentTree {
        node: NodeId,
    },

    /// No router with this identity is registered in the domain.
    #[error("unknown node: {0}")]
    UnknownNode(NodeId),

    /// Invalid configuration value.
    #[error("configuration error: {0}")]
    Config(String),

    /// A recompute worker thread could not be started.
    #[error("failed to spawn recompute worker: {0}")]
    WorkerSpawn(#[from] std::io::Error),
}
