//! Shared link-state database.
//!
//! One database per [`crate::RoutingDomain`]. Every publish or withdrawal
//! bumps a single version counter; routers compare it against the version
//! their tables were built from to detect staleness without diffing.
//!
//! The entry map is copy-on-write: a [`LsdbSnapshot`] is an `Arc` clone taken
//! under the read lock, so a route computation sees one consistent version
//! for its whole run while writers proceed.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::{LinkStateAdvertisement, NodeId};

type Entries = HashMap<NodeId, Arc<LinkStateAdvertisement>>;

#[derive(Debug, Default)]
struct Inner {
    entries: Arc<Entries>,
    version: u64,
}

/// Map of router identity to its latest advertisement.
#[derive(Debug, Default)]
pub struct LinkStateDatabase {
    inner: RwLock<Inner>,
}

/// Consistent read view of the database at one version.
#[derive(Debug, Clone)]
pub struct LsdbSnapshot {
    entries: Arc<Entries>,
    version: u64,
}

impl LinkStateDatabase {
    /// Create an empty database at version 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the advertisement of `node` and bump the version.
    ///
    /// The version is bumped even when the content is identical; avoiding
    /// needless publishes is the adjacency tracker's job.
    pub fn publish(&self, node: NodeId, lsa: LinkStateAdvertisement) -> u64 {
        let mut inner = self.inner.write();
        Arc::make_mut(&mut inner.entries).insert(node, Arc::new(lsa));
        inner.version += 1;
        debug!("LSA published by {} (version {})", node, inner.version);
        inner.version
    }

    /// Remove the advertisement of `node`.
    ///
    /// Returns the new version if an entry was present, bumping it exactly
    /// once; otherwise nothing changes.
    pub fn withdraw(&self, node: &NodeId) -> Option<u64> {
        let mut inner = self.inner.write();
        if !inner.entries.contains_key(node) {
            return None;
        }
        Arc::make_mut(&mut inner.entries).remove(node);
        inner.version += 1;
        debug!("LSA withdrawn for {} (version {})", node, inner.version);
        Some(inner.version)
    }

    /// Take a consistent view for one route computation.
    pub fn snapshot(&self) -> LsdbSnapshot {
        let inner = self.inner.read();
        LsdbSnapshot {
            entries: Arc::clone(&inner.entries),
            version: inner.version,
        }
    }

    /// Current version.
    pub fn version(&self) -> u64 {
        self.inner.read().version
    }

    /// Latest advertisement of `node`.
    pub fn get(&self, node: &NodeId) -> Option<Arc<LinkStateAdvertisement>> {
        self.inner.read().entries.get(node).cloned()
    }

    pub fn contains(&self, node: &NodeId) -> bool {
        self.inner.read().entries.contains_key(node)
    }

    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry and reset the version to 0.
    ///
    /// Only meaningful when no router of the domain is still alive: their
    /// last-applied versions would otherwise be ahead of the database.
    pub fn clear(&self) {
        let mut inner = self.inner.write();
        inner.entries = Arc::new(HashMap::new());
        inner.version = 0;
    }
}

impl LsdbSnapshot {
    /// Database version this view was taken at.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Advertisement of `node` at this version.
    pub fn get(&self, node: &NodeId) -> Option<&LinkStateAdvertisement> {
        self.entries.get(node).map(|lsa| lsa.as_ref())
    }

    pub fn contains(&self, node: &NodeId) -> bool {
        self.entries.contains_key(node)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
