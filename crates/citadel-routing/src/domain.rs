//! Routing domain: database, router registry and worker pool.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::config::RoutingConfig;
use crate::error::{Error, Result};
use crate::events::RoutingEvent;
use crate::lsdb::LinkStateDatabase;
use crate::router::Router;
use crate::scheduler::{RecomputePool, WorkQueue};
use crate::topology::Topology;
use crate::{LinkStateAdvertisement, Locator, NodeId};

/// State every router of a domain shares.
#[derive(Debug)]
pub(crate) struct DomainShared {
    pub(crate) lsdb: LinkStateDatabase,
    pub(crate) queue: Option<Arc<WorkQueue>>,
    routers: RwLock<HashMap<NodeId, Arc<Router>>>,
    async_recompute: bool,
    bulk_build_done: AtomicBool,
    events: broadcast::Sender<RoutingEvent>,
}

impl DomainShared {
    pub(crate) fn emit(&self, event: RoutingEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    pub(crate) fn is_registered(&self, node: &NodeId) -> bool {
        self.routers.read().contains_key(node)
    }

    /// Stale tables may be rebuilt on the worker pool.
    pub(crate) fn background_enabled(&self) -> bool {
        self.async_recompute
            && self.queue.is_some()
            && self.bulk_build_done.load(Ordering::Acquire)
    }
}

/// One coherent routing domain.
///
/// Owns the link-state database every router publishes into, the registry of
/// routers by [`NodeId`], and the recompute workers. Dropping the domain
/// stops the workers and empties the registry.
#[derive(Debug)]
pub struct RoutingDomain {
    shared: Arc<DomainShared>,
    config: RoutingConfig,
    pool: Option<RecomputePool>,
}

impl RoutingDomain {
    /// Create a domain; starts the worker pool if background recompute is
    /// enabled.
    pub fn new(config: RoutingConfig) -> Result<Self> {
        config.validate()?;

        let pool = if config.async_recompute {
            Some(RecomputePool::start(
                Arc::new(WorkQueue::new()),
                config.worker_count,
            )?)
        } else {
            None
        };
        let (events, _) = broadcast::channel(config.event_capacity);

        let shared = Arc::new(DomainShared {
            lsdb: LinkStateDatabase::new(),
            queue: pool.as_ref().map(|p| Arc::clone(p.queue())),
            routers: RwLock::new(HashMap::new()),
            async_recompute: config.async_recompute,
            bulk_build_done: AtomicBool::new(false),
            events,
        });

        Ok(Self {
            shared,
            config,
            pool,
        })
    }

    pub fn config(&self) -> &RoutingConfig {
        &self.config
    }

    pub fn lsdb(&self) -> &LinkStateDatabase {
        &self.shared.lsdb
    }

    /// Register a router at `locator` with a fresh random identity.
    pub fn create(&self, locator: Locator) -> Arc<Router> {
        self.create_with_id(NodeId::random(), locator)
    }

    /// Register a router with a known identity (a reloaded node).
    ///
    /// The router starts with an empty LSA. If `id` is already registered
    /// the existing router is returned unchanged.
    pub fn create_with_id(&self, id: NodeId, locator: Locator) -> Arc<Router> {
        let router = {
            let mut routers = self.shared.routers.write();
            if let Some(existing) = routers.get(&id) {
                return Arc::clone(existing);
            }
            let router = Router::new(id, locator, Arc::clone(&self.shared));
            routers.insert(id, Arc::clone(&router));
            router
        };

        let version = self
            .shared
            .lsdb
            .publish(id, LinkStateAdvertisement::empty());
        info!("Router {} created at {}", id, locator);
        self.shared.emit(RoutingEvent::RouterCreated { node: id });
        self.shared.emit(RoutingEvent::LsaPublished { node: id, version });
        router
    }

    /// Remove a router, withdraw its LSA and drop it from the adjacency of
    /// every router that listed it.
    pub fn destroy(&self, id: &NodeId) -> Result<()> {
        let router = self
            .shared
            .routers
            .write()
            .remove(id)
            .ok_or(Error::UnknownNode(*id))?;
        router.retire();

        if let Some(version) = self.shared.lsdb.withdraw(id) {
            self.shared.emit(RoutingEvent::LsaWithdrawn { node: *id, version });
        }
        for neighbor in self.routers() {
            if neighbor.forget_neighbor(id) {
                debug!("Router {} dropped destroyed neighbor {}", neighbor.id(), id);
            }
        }
        info!("Router {} destroyed", id);
        self.shared.emit(RoutingEvent::RouterDestroyed { node: *id });
        Ok(())
    }

    pub fn router(&self, id: &NodeId) -> Option<Arc<Router>> {
        self.shared.routers.read().get(id).cloned()
    }

    /// All registered routers, ordered by id.
    pub fn routers(&self) -> Vec<Arc<Router>> {
        let mut routers: Vec<_> = self.shared.routers.read().values().cloned().collect();
        routers.sort_by_key(|r| r.id());
        routers
    }

    pub fn len(&self) -> usize {
        self.shared.routers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `from` is registered and has a route to the registered
    /// router `to`.
    pub fn has_route(&self, from: &NodeId, to: &NodeId) -> bool {
        self.router(from).is_some_and(|r| r.has_route(to))
    }

    /// Drive [`Router::update`] on every router, in id order.
    pub fn update_all(&self, topology: &dyn Topology, full_refresh: bool) {
        for router in self.routers() {
            router.update(topology, full_refresh);
        }
    }

    /// Signal that the topology finished its initial bulk build; until then
    /// every recompute runs inline.
    pub fn set_bulk_build_done(&self, done: bool) {
        self.shared.bulk_build_done.store(done, Ordering::Release);
    }

    pub fn bulk_build_done(&self) -> bool {
        self.shared.bulk_build_done.load(Ordering::Acquire)
    }

    /// Subscribe to routing events from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<RoutingEvent> {
        self.shared.events.subscribe()
    }

    /// Wait until no recompute job is queued or running. Returns `false` on
    /// timeout; always `true` without a worker pool.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        match &self.pool {
            Some(pool) => pool.queue().wait_idle(timeout),
            None => true,
        }
    }
}

impl Drop for RoutingDomain {
    fn drop(&mut self) {
        // Routers hold the shared state; break the cycle through the registry.
        self.shared.routers.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Direction, Exit, StaticTopology};

    #[test]
    fn create_publishes_empty_lsa() {
        let domain = RoutingDomain::new(RoutingConfig::synchronous()).unwrap();
        let mut rx = domain.subscribe();

        let router = domain.create(Locator::ORIGIN);

        assert_eq!(domain.len(), 1);
        assert_eq!(domain.lsdb().version(), 1);
        assert!(domain.lsdb().get(&router.id()).unwrap().is_empty());
        assert_eq!(
            rx.try_recv().unwrap(),
            RoutingEvent::RouterCreated { node: router.id() }
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            RoutingEvent::LsaPublished {
                node: router.id(),
                version: 1
            }
        );
    }

    #[test]
    fn create_with_existing_id_returns_same_router() {
        let domain = RoutingDomain::new(RoutingConfig::synchronous()).unwrap();
        let a = domain.create_with_id(NodeId(9), Locator::ORIGIN);
        let b = domain.create_with_id(NodeId(9), Locator::planar(4, 4));
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(domain.lsdb().version(), 1);
    }

    #[test]
    fn destroy_withdraws_and_unregisters() {
        let domain = RoutingDomain::new(RoutingConfig::synchronous()).unwrap();
        let a = domain.create_with_id(NodeId(1), Locator::ORIGIN);
        let b = domain.create_with_id(NodeId(2), Locator::planar(1, 0));
        let before = domain.lsdb().version();
        let mut rx = domain.subscribe();

        domain.destroy(&b.id()).unwrap();

        assert_eq!(domain.lsdb().version(), before + 1);
        assert_eq!(
            rx.try_recv().unwrap(),
            RoutingEvent::LsaWithdrawn {
                node: b.id(),
                version: before + 1
            }
        );
        assert!(!domain.lsdb().contains(&b.id()));
        assert!(domain.router(&b.id()).is_none());
        assert!(!a.has_route(&b.id()));
        assert!(matches!(
            domain.destroy(&b.id()),
            Err(Error::UnknownNode(id)) if id == b.id()
        ));
    }

    #[test]
    fn has_route_requires_registered_target() {
        let domain = RoutingDomain::new(RoutingConfig::synchronous()).unwrap();
        let topology = StaticTopology::new();
        let la = Locator::ORIGIN;
        let lb = la.step(Direction::UP);
        let a = domain.create_with_id(NodeId(1), la);
        let b = domain.create_with_id(NodeId(2), lb);
        topology.place(la, a.id());
        topology.place(lb, b.id());
        topology.link(la, lb, 1, false);
        domain.update_all(&topology, true);

        assert!(domain.has_route(&a.id(), &b.id()));
        assert_eq!(a.exit_for(&b.id()), Some(Exit::Toward(Direction::UP)));
        assert!(!domain.has_route(&a.id(), &NodeId(77)));
        assert!(!domain.has_route(&NodeId(77), &a.id()));
    }

    #[test]
    fn synchronous_domain_has_no_pool() {
        let domain = RoutingDomain::new(RoutingConfig::synchronous()).unwrap();
        assert!(domain.pool.is_none());
        assert!(domain.wait_idle(Duration::from_millis(1)));
    }

    #[test]
    fn rejects_invalid_config() {
        let config = RoutingConfig {
            worker_count: 0,
            ..RoutingConfig::default()
        };
        assert!(matches!(RoutingDomain::new(config), Err(Error::Config(_))));
    }

    #[test]
    fn routers_are_listed_by_id() {
        let domain = RoutingDomain::new(RoutingConfig::synchronous()).unwrap();
        domain.create_with_id(NodeId(3), Locator::ORIGIN);
        domain.create_with_id(NodeId(1), Locator::planar(1, 0));
        domain.create_with_id(NodeId(2), Locator::planar(2, 0));

        let ids: Vec<_> = domain.routers().iter().map(|r| r.id()).collect();
        assert_eq!(ids, vec![NodeId(1), NodeId(2), NodeId(3)]);
    }

    #[test]
    fn bulk_build_flag_gates_background_recompute() {
        let domain = RoutingDomain::new(RoutingConfig::default()).unwrap();
        assert!(!domain.shared.background_enabled());
        domain.set_bulk_build_done(true);
        assert!(domain.bulk_build_done());
        assert!(domain.shared.background_enabled());
    }
}
