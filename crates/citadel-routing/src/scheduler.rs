//! Background recomputation: per-router job state and the worker pool.
//!
//! Each router owns a [`JobState`]. The state guarantees at most one job
//! per router is queued or running:
//!
//! ```text
//!   Idle ──request(v)──▶ Pending(g, v) ──claim(g)──▶ Computing(g, v) ──complete──▶ Idle
//!                          │     ▲                        │
//!                request(v')     │              request(v'): follow_up = v'
//!                          └─────┘ (new g, old g cancelled)   (resubmitted on complete)
//! ```
//!
//! Jobs carry their generation; a worker that pops a job whose generation no
//! longer matches the router's pending generation drops it unrun. There is no
//! cancellation once a job is computing.

use std::collections::VecDeque;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, info};

use crate::error::Result;
use crate::NodeId;

/// Scheduling state of one router.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JobState {
    /// No job queued or running.
    #[default]
    Idle,
    /// A job is queued for `target`.
    Pending {
        generation: u64,
        target: u64,
    },
    /// A job is running for `target`; `follow_up` records a newer version
    /// requested meanwhile.
    Computing {
        generation: u64,
        target: u64,
        follow_up: Option<u64>,
    },
}

/// What the caller of [`JobSlot::request`] must do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    /// A job for this version (or newer) is already queued.
    AlreadyPending,
    /// A job is running; the version was recorded as its follow-up.
    FollowUp,
    /// Queue a new job with this generation, after removing `superseded`
    /// from the queue if set.
    Submit {
        generation: u64,
        superseded: Option<u64>,
    },
}

/// A router's job state plus its generation counter.
#[derive(Debug, Default)]
pub struct JobSlot {
    state: JobState,
    next_generation: u64,
}

impl JobSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    /// A job is queued or running.
    pub fn is_busy(&self) -> bool {
        self.state != JobState::Idle
    }

    fn fresh_generation(&mut self) -> u64 {
        self.next_generation += 1;
        self.next_generation
    }

    /// Ask for a recompute up to `target`.
    pub fn request(&mut self, target: u64) -> Request {
        match self.state {
            JobState::Idle => {
                let generation = self.fresh_generation();
                self.state = JobState::Pending { generation, target };
                Request::Submit {
                    generation,
                    superseded: None,
                }
            }
            JobState::Pending { target: queued, .. } if queued >= target => Request::AlreadyPending,
            JobState::Pending { generation: old, .. } => {
                let generation = self.fresh_generation();
                self.state = JobState::Pending { generation, target };
                Request::Submit {
                    generation,
                    superseded: Some(old),
                }
            }
            JobState::Computing {
                generation,
                target: running,
                follow_up,
            } => {
                if target > running && follow_up.map_or(true, |f| target > f) {
                    self.state = JobState::Computing {
                        generation,
                        target: running,
                        follow_up: Some(target),
                    };
                }
                Request::FollowUp
            }
        }
    }

    /// A worker picked up the job with `generation`. Returns its target
    /// version, or `None` if the job was superseded.
    pub fn claim(&mut self, generation: u64) -> Option<u64> {
        match self.state {
            JobState::Pending {
                generation: pending,
                target,
            } if pending == generation => {
                self.state = JobState::Computing {
                    generation,
                    target,
                    follow_up: None,
                };
                Some(target)
            }
            _ => None,
        }
    }

    /// Forget a queued job that was removed from the queue. Returns `false`
    /// if it was already claimed or superseded.
    pub fn cancel(&mut self, generation: u64) -> bool {
        match self.state {
            JobState::Pending {
                generation: pending,
                ..
            } if pending == generation => {
                self.state = JobState::Idle;
                true
            }
            _ => false,
        }
    }

    /// The job with `generation` finished (successfully or not). Returns the
    /// follow-up version to resubmit, if any.
    pub fn complete(&mut self, generation: u64) -> Option<u64> {
        match self.state {
            JobState::Computing {
                generation: running,
                follow_up,
                ..
            } if running == generation => {
                self.state = JobState::Idle;
                follow_up
            }
            _ => None,
        }
    }
}

/// Queue priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
    /// A router's first computation.
    High,
    /// Steady-state recomputation.
    Normal,
}

/// A queued unit of work for one router.
pub struct Job {
    node: NodeId,
    generation: u64,
    run: Box<dyn FnOnce() + Send>,
}

impl Job {
    pub fn new<F>(node: NodeId, generation: u64, run: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            node,
            generation,
            run: Box::new(run),
        }
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    fn run(self) {
        (self.run)()
    }
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Job")
            .field("node", &self.node)
            .field("generation", &self.generation)
            .finish()
    }
}

#[derive(Debug, Default)]
struct QueueInner {
    high: VecDeque<Job>,
    normal: VecDeque<Job>,
    active: usize,
    shutdown: bool,
}

impl QueueInner {
    fn is_drained(&self) -> bool {
        self.high.is_empty() && self.normal.is_empty() && self.active == 0
    }
}

/// Two-level FIFO of recompute jobs shared by the workers.
#[derive(Debug, Default)]
pub struct WorkQueue {
    inner: Mutex<QueueInner>,
    available: Condvar,
    drained: Condvar,
}

impl WorkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a job. Returns `false`, dropping the job, after shutdown.
    pub fn submit(&self, job: Job, priority: Priority) -> bool {
        let mut inner = self.inner.lock();
        if inner.shutdown {
            debug!("Rejecting recompute job {} of {} after shutdown", job.generation, job.node);
            return false;
        }
        match priority {
            Priority::High => inner.high.push_back(job),
            Priority::Normal => inner.normal.push_back(job),
        }
        self.available.notify_one();
        true
    }


    /// Remove a not-yet-started job. Returns `true` if it was still queued.
    pub fn cancel(&self, node: NodeId, generation: u64) -> bool {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let matches = |j: &Job| j.node == node && j.generation == generation;
        for queue in [&mut inner.high, &mut inner.normal] {
            if let Some(pos) = queue.iter().position(matches) {
                queue.remove(pos);
                return true;
            }
        }
        false
    }

    /// Number of queued (not running) jobs.
    pub fn len(&self) -> usize {
        let inner = self.inner.lock();
        inner.high.len() + inner.normal.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Block until a job is available; `None` once shut down.
    fn next(&self) -> Option<Job> {
        let mut inner = self.inner.lock();
        loop {
            if inner.shutdown {
                return None;
            }
            if let Some(job) = inner.high.pop_front().or_else(|| inner.normal.pop_front()) {
                inner.active += 1;
                return Some(job);
            }
            self.available.wait(&mut inner);
        }
    }

    fn finish(&self) {
        let mut inner = self.inner.lock();
        inner.active -= 1;
        if inner.is_drained() {
            self.drained.notify_all();
        }
    }

    /// Wait until nothing is queued or running. Returns `false` on timeout.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut inner = self.inner.lock();
        while !inner.is_drained() {
            if self.drained.wait_until(&mut inner, deadline).timed_out() {
                return inner.is_drained();
            }
        }
        true
    }

    /// Stop handing out jobs and drop everything still queued.
    pub fn shutdown(&self) {
        let mut inner = self.inner.lock();
        inner.shutdown = true;
        inner.high.clear();
        inner.normal.clear();
        self.available.notify_all();
        if inner.is_drained() {
            self.drained.notify_all();
        }
    }
}

/// Fixed-size pool of recompute worker threads.
#[derive(Debug)]
pub struct RecomputePool {
    queue: Arc<WorkQueue>,
    workers: Vec<JoinHandle<()>>,
}

impl RecomputePool {
    /// Start `worker_count` named worker threads on `queue`.
    pub fn start(queue: Arc<WorkQueue>, worker_count: usize) -> Result<Self> {
        let mut workers = Vec::with_capacity(worker_count);
        for i in 0..worker_count {
            let queue = Arc::clone(&queue);
            let handle = std::thread::Builder::new()
                .name(format!("citadel-route-{i}"))
                .spawn(move || worker_loop(&queue))?;
            workers.push(handle);
        }
        info!(worker_count, "Recompute worker pool started");
        Ok(Self { queue, workers })
    }

    pub fn queue(&self) -> &Arc<WorkQueue> {
        &self.queue
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }
}

impl Drop for RecomputePool {
    fn drop(&mut self) {
        self.queue.shutdown();
        for handle in self.workers.drain(..) {
            // A worker only panics outside job execution if the queue itself
            // is broken; nothing left to clean up either way.
            let _ = handle.join();
        }
        info!("Recompute worker pool stopped");
    }
}

fn worker_loop(queue: &WorkQueue) {
    while let Some(job) = queue.next() {
        debug!("Running recompute job {} for {}", job.generation, job.node);
        job.run();
        queue.finish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn idle_request_submits() {
        let mut slot = JobSlot::new();
        assert_eq!(
            slot.request(3),
            Request::Submit {
                generation: 1,
                superseded: None
            }
        );
        assert_eq!(slot.state(), JobState::Pending { generation: 1, target: 3 });
    }

    #[test]
    fn pending_same_version_is_not_resubmitted() {
        let mut slot = JobSlot::new();
        slot.request(3);
        assert_eq!(slot.request(3), Request::AlreadyPending);
        assert_eq!(slot.request(2), Request::AlreadyPending);
    }

    #[test]
    fn newer_version_supersedes_pending() {
        let mut slot = JobSlot::new();
        slot.request(3);
        assert_eq!(
            slot.request(5),
            Request::Submit {
                generation: 2,
                superseded: Some(1)
            }
        );
        // The superseded job can no longer be claimed.
        assert_eq!(slot.claim(1), None);
        assert_eq!(slot.claim(2), Some(5));
    }

    #[test]
    fn request_while_computing_becomes_follow_up() {
        let mut slot = JobSlot::new();
        slot.request(3);
        slot.claim(1);

        assert_eq!(slot.request(4), Request::FollowUp);
        assert_eq!(slot.request(6), Request::FollowUp);
        assert_eq!(slot.request(5), Request::FollowUp);
        assert_eq!(slot.complete(1), Some(6));
        assert_eq!(slot.state(), JobState::Idle);
    }

    #[test]
    fn request_for_running_version_needs_no_follow_up() {
        let mut slot = JobSlot::new();
        slot.request(3);
        slot.claim(1);
        slot.request(3);
        assert_eq!(slot.complete(1), None);
    }

    #[test]
    fn complete_ignores_foreign_generation() {
        let mut slot = JobSlot::new();
        slot.request(3);
        slot.claim(1);
        assert_eq!(slot.complete(7), None);
        assert!(slot.is_busy());
    }

    #[test]
    fn cancel_removes_only_matching_job() {
        let queue = WorkQueue::new();
        queue.submit(Job::new(NodeId(1), 1, || {}), Priority::Normal);
        queue.submit(Job::new(NodeId(1), 2, || {}), Priority::High);
        queue.submit(Job::new(NodeId(2), 1, || {}), Priority::Normal);

        assert!(queue.cancel(NodeId(1), 2));
        assert!(!queue.cancel(NodeId(1), 2));
        assert!(!queue.cancel(NodeId(3), 1));
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn high_priority_runs_first() {
        let queue = WorkQueue::new();
        queue.submit(Job::new(NodeId(1), 1, || {}), Priority::Normal);
        queue.submit(Job::new(NodeId(2), 1, || {}), Priority::High);

        assert_eq!(queue.next().map(|j| j.node()), Some(NodeId(2)));
        assert_eq!(queue.next().map(|j| j.node()), Some(NodeId(1)));
    }

    #[test]
    fn pool_runs_every_job_and_drains() {
        let queue = Arc::new(WorkQueue::new());
        let pool = RecomputePool::start(Arc::clone(&queue), 3).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));

        for i in 0..50u128 {
            let counter = Arc::clone(&counter);
            queue.submit(
                Job::new(NodeId(i), 1, move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                }),
                Priority::Normal,
            );
        }

        assert!(queue.wait_idle(Duration::from_secs(10)));
        assert_eq!(counter.load(Ordering::SeqCst), 50);
        assert_eq!(pool.worker_count(), 3);
    }

    #[test]
    fn shutdown_drops_queued_jobs() {
        let queue = WorkQueue::new();
        assert!(queue.submit(Job::new(NodeId(1), 1, || {}), Priority::Normal));
        queue.shutdown();
        assert!(queue.is_empty());
        assert!(queue.next().is_none());
        assert!(!queue.submit(Job::new(NodeId(1), 2, || {}), Priority::Normal));
        assert!(queue.is_empty());
        assert!(queue.wait_idle(Duration::from_millis(10)));
    }
}
