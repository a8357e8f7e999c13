//! Cost-ordered destination index.

use std::collections::HashMap;
use std::sync::Arc;

use crate::{NodeId, RouteCost};

/// Destinations of one router ordered by ascending path cost, the router
/// itself first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CostIndex {
    order: Arc<[NodeId]>,
}

impl CostIndex {
    /// Build the index from a cost table. Equal costs are ordered by id.
    pub fn build(source: NodeId, cost_table: &HashMap<NodeId, RouteCost>) -> Self {
        let mut by_cost: Vec<(u64, NodeId)> = cost_table
            .iter()
            .filter(|(id, _)| **id != source)
            .map(|(id, c)| (c.cost, *id))
            .collect();
        by_cost.sort_unstable();

        let order: Vec<NodeId> = std::iter::once(source)
            .chain(by_cost.into_iter().map(|(_, id)| id))
            .collect();
        Self { order: order.into() }
    }

    pub fn as_slice(&self) -> &[NodeId] {
        &self.order
    }

    /// Shared handle to the ordering.
    pub fn to_shared(&self) -> Arc<[NodeId]> {
        Arc::clone(&self.order)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
