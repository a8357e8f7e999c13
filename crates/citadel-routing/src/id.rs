//! Routing identities.
//!
//! Routers are keyed by an opaque random [`NodeId`], never by where they sit
//! in the mesh: a node may move while keeping its identity.

use std::fmt;

/// Opaque 128-bit router identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NodeId(pub u128);

impl NodeId {
    /// Generate a fresh random identifier.
    pub fn random() -> Self {
        Self(rand::random())
    }

    /// Raw value.
    pub const fn as_u128(&self) -> u128 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

/// Reference to a capability provider attached to a router (a shared power
/// source, for instance).
///
/// Providers are advertised in LSAs and collected into each router's
/// capability table along non-blocking paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ProviderId(pub u64);

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "provider-{}", self.0)
    }
}
