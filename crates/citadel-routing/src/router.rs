//! Per-node router: adjacency, route tables and their refresh.
//!
//! A router's tables are rebuilt whenever the domain's database version moves
//! past the version they were last applied at. Read accessors used by
//! transport force an inline rebuild; the periodic [`Router::update`] driver
//! hands the rebuild to the worker pool once the domain is past its bulk
//! build.

use std::any::Any;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, warn};

use crate::adjacency::{AdjacencyChange, AdjacencyTracker};
use crate::builder::{build_route_tables, RouteTables};
use crate::cost_index::CostIndex;
use crate::domain::DomainShared;
use crate::error::Result;
use crate::events::RoutingEvent;
use crate::scheduler::{Job, JobSlot, JobState, Priority, Request};
use crate::topology::Topology;
use crate::{Direction, Exit, Locator, NodeId, ProviderId};

#[cfg(test)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Fault {
    Error,
    Panic,
}

/// One routing node of a [`crate::RoutingDomain`].
pub struct Router {
    id: NodeId,
    locator: Locator,
    shared: Arc<DomainShared>,
    this: Weak<Router>,

    tracker: Mutex<AdjacencyTracker>,
    tables: RwLock<Arc<RouteTables>>,
    // Written only while `tables` is write-locked.
    last_applied: AtomicU64,
    // Lock order: cost_index, then tables.
    cost_index: Mutex<Option<CostIndex>>,
    job: Mutex<JobSlot>,

    needs_refresh: AtomicBool,
    deferred_recheck: AtomicBool,

    #[cfg(test)]
    fault: Mutex<Option<Fault>>,
}

impl Router {
    pub(crate) fn new(id: NodeId, locator: Locator, shared: Arc<DomainShared>) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            id,
            locator,
            shared,
            this: this.clone(),
            tracker: Mutex::new(AdjacencyTracker::new()),
            tables: RwLock::new(Arc::new(RouteTables::initial(id))),
            last_applied: AtomicU64::new(0),
            cost_index: Mutex::new(None),
            job: Mutex::new(JobSlot::new()),
            needs_refresh: AtomicBool::new(false),
            deferred_recheck: AtomicBool::new(true),
            #[cfg(test)]
            fault: Mutex::new(None),
        })
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn locator(&self) -> Locator {
        self.locator
    }

    /// Database version the current tables were applied at; 0 before the
    /// first computation.
    pub fn last_applied_version(&self) -> u64 {
        self.last_applied.load(Ordering::Acquire)
    }

    /// Periodic driver.
    ///
    /// Rechecks adjacency when `full_refresh` is set or an earlier recheck
    /// was deferred, then schedules a recompute if the tables are stale.
    /// While a background job is queued or running the recheck is deferred
    /// to a later call. Returns the recheck outcome, or `None` if no recheck
    /// ran.
    pub fn update(&self, topology: &dyn Topology, full_refresh: bool) -> Option<AdjacencyChange> {
        let mut change = None;
        if full_refresh || self.deferred_recheck.load(Ordering::Acquire) {
            if self.job.lock().is_busy() {
                self.deferred_recheck.store(true, Ordering::Release);
            } else {
                self.deferred_recheck.store(false, Ordering::Release);
                let outcome = self.recheck_adjacency(topology);
                if matches!(
                    outcome,
                    AdjacencyChange::Unsettled | AdjacencyChange::Unresolved
                ) {
                    self.deferred_recheck.store(true, Ordering::Release);
                }
                change = Some(outcome);
            }
        }
        self.ensure_up_to_date(false);
        change
    }

    /// Probe the topology and publish a new LSA if the adjacency changed.
    pub fn recheck_adjacency(&self, topology: &dyn Topology) -> AdjacencyChange {
        let mut tracker = self.tracker.lock();
        let change = tracker.recheck(topology, &self.locator);
        match change {
            AdjacencyChange::Changed => {
                let version = self.shared.lsdb.publish(self.id, tracker.advertisement());
                drop(tracker);
                self.needs_refresh.store(true, Ordering::Release);
                self.shared.emit(RoutingEvent::LsaPublished {
                    node: self.id,
                    version,
                });
            }
            AdjacencyChange::Unsettled => {
                debug!("Adjacency recheck of {} aborted: neighbor unsettled", self.id);
            }
            AdjacencyChange::Unresolved => {
                debug!("Adjacency recheck of {} aborted: {} unresolved", self.id, self.locator);
            }
            AdjacencyChange::Unchanged => {}
        }
        change
    }

    /// Route table after a forced refresh.
    pub fn route_table(&self) -> HashMap<NodeId, Exit> {
        self.refreshed().route_table.clone()
    }

    /// Known destinations by ascending path cost, this router first.
    pub fn nodes_by_ascending_cost(&self) -> Arc<[NodeId]> {
        self.ensure_up_to_date(true);
        let mut index = self.cost_index.lock();
        if let Some(existing) = index.as_ref() {
            return existing.to_shared();
        }
        let tables = Arc::clone(&*self.tables.read());
        let built = CostIndex::build(self.id, &tables.cost_table);
        let order = built.to_shared();
        *index = Some(built);
        order
    }

    /// Whether `target` is a registered router this router can reach.
    pub fn has_route(&self, target: &NodeId) -> bool {
        self.shared.is_registered(target) && self.refreshed().has_route(target)
    }

    /// Exit to leave through towards `target`.
    pub fn exit_for(&self, target: &NodeId) -> Option<Exit> {
        self.refreshed().exit_for(target)
    }

    /// Path cost to `target`; 0 for this router.
    pub fn cost_to(&self, target: &NodeId) -> Option<u64> {
        self.refreshed().cost_to(target)
    }

    /// Providers reachable along non-blocking paths.
    pub fn capability_providers(&self) -> BTreeSet<ProviderId> {
        self.refreshed().capabilities.clone()
    }

    /// Current tables, without refreshing.
    pub fn tables(&self) -> Arc<RouteTables> {
        Arc::clone(&*self.tables.read())
    }

    /// Adjacency changed since the last [`Router::take_refresh`].
    pub fn needs_refresh(&self) -> bool {
        self.needs_refresh.load(Ordering::Acquire)
    }

    /// Read and clear the presentation refresh flag.
    pub fn take_refresh(&self) -> bool {
        self.needs_refresh.swap(false, Ordering::AcqRel)
    }

    pub fn is_routed_exit(&self, direction: Direction) -> bool {
        self.tracker.lock().is_routed_exit(direction)
    }

    /// Planar and vertical exits carrying no link.
    pub fn non_routed_exits(&self) -> Vec<Direction> {
        self.tracker.lock().non_routed_exits()
    }

    fn refreshed(&self) -> Arc<RouteTables> {
        self.ensure_up_to_date(true);
        self.tables()
    }

    /// Bring the tables up to the current database version, inline when
    /// `force` is set or background recompute is unavailable.
    fn ensure_up_to_date(&self, force: bool) {
        let current = self.shared.lsdb.version();
        if current <= self.last_applied_version() {
            return;
        }
        if !force && self.shared.background_enabled() {
            self.schedule(current);
        } else {
            self.recompute(None);
        }
    }

    fn schedule(&self, target: u64) {
        let Some(queue) = self.shared.queue.as_ref() else {
            self.recompute(None);
            return;
        };

        let mut slot = self.job.lock();
        match slot.request(target) {
            Request::AlreadyPending => {}
            Request::FollowUp => {
                debug!("Recompute of {} to version {} queued as follow-up", self.id, target);
            }
            Request::Submit {
                generation,
                superseded,
            } => {
                if let Some(old) = superseded {
                    if queue.cancel(self.id, old) {
                        debug!("Recompute job {} of {} superseded by {}", old, self.id, generation);
                    }
                }
                let Some(router) = self.this.upgrade() else {
                    return;
                };
                let priority = if self.last_applied_version() == 0 {
                    Priority::High
                } else {
                    Priority::Normal
                };
                let job = Job::new(self.id, generation, move || router.run_job(generation));
                if !queue.submit(job, priority) {
                    warn!("Recompute queue closed; {} stays at version {}", self.id, self.last_applied_version());
                    slot.cancel(generation);
                }
            }
        }
    }

    /// Worker entry point.
    fn run_job(&self, generation: u64) {
        let claimed = self.job.lock().claim(generation);
        let Some(target) = claimed else {
            debug!("Dropping superseded recompute job {} of {}", generation, self.id);
            return;
        };

        if target > self.last_applied_version() {
            self.recompute(Some(target));
        }
        self.finish_job(generation);
    }

    /// Return the slot to idle and resubmit a recorded follow-up.
    fn finish_job(&self, generation: u64) {
        let follow_up = self.job.lock().complete(generation);
        if let Some(next) = follow_up {
            let next = next.max(self.shared.lsdb.version());
            if next > self.last_applied_version() {
                self.schedule(next);
            }
        }
    }

    /// Compute and apply. `target` is the version a background job captured;
    /// inline computations apply at their snapshot version.
    fn recompute(&self, target: Option<u64>) {
        match panic::catch_unwind(AssertUnwindSafe(|| self.compute())) {
            Ok(Ok(tables)) => {
                let version = target.unwrap_or(tables.version);
                self.apply(tables, version);
            }
            Ok(Err(e)) => self.report_failure(target, e.to_string()),
            Err(payload) => self.report_failure(target, panic_reason(payload.as_ref())),
        }
    }

    fn compute(&self) -> Result<RouteTables> {
        #[cfg(test)]
        self.trip_fault()?;

        let (adjacency, providers, snapshot) = {
            let tracker = self.tracker.lock();
            (
                tracker.adjacency(),
                tracker.providers(),
                self.shared.lsdb.snapshot(),
            )
        };
        build_route_tables(self.id, &adjacency, &providers, &snapshot)
    }

    /// Swap in `tables` unless a result at least as new is already applied.
    /// The stored tables are stamped with `version`.
    fn apply(&self, mut tables: RouteTables, version: u64) -> bool {
        let destinations = tables.route_table.len();
        {
            let mut index = self.cost_index.lock();
            let mut current = self.tables.write();
            if version <= self.last_applied_version() {
                debug!(
                    "Discarding recompute of {} at version {} (applied {})",
                    self.id,
                    version,
                    self.last_applied_version()
                );
                return false;
            }
            tables.version = version;
            *current = Arc::new(tables);
            self.last_applied.store(version, Ordering::Release);
            *index = None;
        }

        debug!("Route table of {} applied at version {} ({} destinations)", self.id, version, destinations);
        self.shared.emit(RoutingEvent::RouteTableUpdated {
            node: self.id,
            version,
            destinations,
        });
        true
    }

    fn report_failure(&self, target: Option<u64>, reason: String) {
        let target_version = target.unwrap_or_else(|| self.shared.lsdb.version());
        error!("Route recompute of {} for version {} failed: {}", self.id, target_version, reason);
        self.shared.emit(RoutingEvent::RecomputeFailed {
            node: self.id,
            target_version,
            reason,
        });
    }

    /// Remove a destroyed router from the adjacency and republish.
    pub(crate) fn forget_neighbor(&self, node: &NodeId) -> bool {
        let mut tracker = self.tracker.lock();
        if !tracker.forget(node) {
            return false;
        }
        let version = self.shared.lsdb.publish(self.id, tracker.advertisement());
        drop(tracker);
        self.needs_refresh.store(true, Ordering::Release);
        self.shared.emit(RoutingEvent::LsaPublished {
            node: self.id,
            version,
        });
        true
    }

    /// Drop a queued job; used when the router leaves the domain.
    pub(crate) fn retire(&self) {
        let Some(queue) = self.shared.queue.as_ref() else {
            return;
        };
        let mut slot = self.job.lock();
        if let JobState::Pending { generation, .. } = slot.state() {
            queue.cancel(self.id, generation);
            slot.cancel(generation);
        }
    }

    #[cfg(test)]
    pub(crate) fn inject_fault(&self, fault: Fault) {
        *self.fault.lock() = Some(fault);
    }

    #[cfg(test)]
    fn trip_fault(&self) -> Result<()> {
        match self.fault.lock().take() {
            Some(Fault::Error) => Err(crate::Error::InconsistentTree { node: self.id }),
            Some(Fault::Panic) => panic!("injected recompute panic"),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("id", &self.id)
            .field("locator", &self.locator)
            .field("last_applied", &self.last_applied_version())
            .finish_non_exhaustive()
    }
}

fn panic_reason(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic with non-string payload".to_string()
    }
}
