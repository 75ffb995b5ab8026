//! Job Scheduler
//!
//! The scheduler batches re-scheduled work into a single flush per turn.
//!
//! # Algorithm
//!
//! 1. `enqueue` adds a job to the pending batch unless a job with the same
//!    [`JobId`] is already pending. Jobs are identified by id, so the same
//!    logical job (one component's update, one watcher) is queued at most
//!    once per batch no matter how many mutations hit it.
//!
//! 2. The first enqueue into an idle scheduler moves it to
//!    [`FlushState::FlushPending`] and requests a flush according to the
//!    configured [`FlushMode`].
//!
//! 3. `flush` takes the whole batch, returns to `Idle`, and runs each job once
//!    in enqueue order. Jobs enqueued while the flush runs start a new batch,
//!    so a flush never grows while it runs.
//!
//! A failing job aborts only itself; the remaining jobs of the batch still run
//! and the failure is reported in the [`FlushReport`].
//!
//! A job that re-enqueues itself on every run keeps producing batches forever.
//! [`Scheduler::flush_all`] stops after [`MAX_FLUSH_ROUNDS`] batches and logs
//! a warning; a single [`Scheduler::flush`] never loops.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;
use tracing::{debug, error, trace, warn};

use crate::config::FlushMode;
use crate::error::{Error, Result};

/// Upper bound on the batches one [`Scheduler::flush_all`] call runs.
pub const MAX_FLUSH_ROUNDS: usize = 100;

/// Unique identifier for a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JobId(u64);

impl JobId {
    /// Generate a new unique job ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

/// A unit of deferred work.
#[derive(Clone)]
pub struct Job {
    id: JobId,
    run: Rc<dyn Fn() -> Result<()>>,
}

impl Job {
    /// Create a job with the given identity.
    pub fn new<F>(id: JobId, run: F) -> Self
    where
        F: Fn() -> Result<()> + 'static,
    {
        Self {
            id,
            run: Rc::new(run),
        }
    }

    /// The job's identity, used for deduplication.
    pub fn id(&self) -> JobId {
        self.id
    }

    fn run(&self) -> Result<()> {
        (self.run)()
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job").field("id", &self.id).finish()
    }
}

/// Whether a flush has been requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushState {
    /// No batch is pending.
    Idle,
    /// A batch is pending and a flush has been requested.
    FlushPending,
}

/// Outcome of one flush.
#[derive(Debug, Default)]
pub struct FlushReport {
    /// Number of jobs that ran (successfully or not).
    pub ran: usize,
    /// Jobs that returned an error.
    pub failed: Vec<(JobId, Error)>,
}

impl FlushReport {
    /// Whether every job succeeded.
    pub fn is_ok(&self) -> bool {
        self.failed.is_empty()
    }

    fn absorb(&mut self, other: FlushReport) {
        self.ran += other.ran;
        self.failed.extend(other.failed);
    }
}

struct SchedulerInner {
    mode: FlushMode,
    queue: RefCell<IndexMap<JobId, Job>>,
    state: Cell<FlushState>,
    flushes: Cell<u64>,
    after_flush: RefCell<Option<Rc<dyn Fn()>>>,
}

/// Deduplicating batch scheduler.
///
/// Cloning a `Scheduler` creates another handle to the same queue.
#[derive(Clone)]
pub struct Scheduler {
    inner: Rc<SchedulerInner>,
}

impl Scheduler {
    /// Create an idle scheduler.
    pub fn new(mode: FlushMode) -> Self {
        Self {
            inner: Rc::new(SchedulerInner {
                mode,
                queue: RefCell::new(IndexMap::new()),
                state: Cell::new(FlushState::Idle),
                flushes: Cell::new(0),
                after_flush: RefCell::new(None),
            }),
        }
    }

    /// Register a callback that runs at the end of every flush.
    pub(crate) fn set_after_flush(&self, hook: Rc<dyn Fn()>) {
        *self.inner.after_flush.borrow_mut() = Some(hook);
    }

    /// Add a job to the pending batch.
    ///
    /// Returns `false` if a job with the same id was already pending.
    pub fn enqueue(&self, job: Job) -> bool {
        let id = job.id();
        {
            let mut queue = self.inner.queue.borrow_mut();
            if queue.contains_key(&id) {
                trace!(?id, "job already pending");
                return false;
            }
            queue.insert(id, job);
        }
        trace!(?id, "job enqueued");

        if self.inner.state.get() == FlushState::Idle {
            self.inner.state.set(FlushState::FlushPending);
            self.request_flush();
        }
        true
    }

    /// Run the pending batch.
    pub fn flush(&self) -> FlushReport {
        let batch = std::mem::take(&mut *self.inner.queue.borrow_mut());
        self.inner.state.set(FlushState::Idle);

        let mut report = FlushReport::default();
        if !batch.is_empty() {
            self.inner.flushes.set(self.inner.flushes.get() + 1);
        }

        for (id, job) in batch {
            report.ran += 1;
            if let Err(err) = job.run() {
                error!(?id, %err, "job failed");
                report.failed.push((id, err));
            }
        }

        if report.ran > 0 {
            debug!(ran = report.ran, failed = report.failed.len(), "flush finished");
        }

        let hook = self.inner.after_flush.borrow().clone();
        if let Some(hook) = hook {
            hook();
        }
        report
    }

    /// Flush until no job is pending. Jobs queued by a running batch (a
    /// parent update queuing its children, say) run in the following rounds.
    pub fn flush_all(&self) -> FlushReport {
        let mut report = FlushReport::default();
        for _ in 0..MAX_FLUSH_ROUNDS {
            if self.pending() == 0 {
                return report;
            }
            report.absorb(self.flush());
        }
        if self.pending() > 0 {
            warn!(
                pending = self.pending(),
                rounds = MAX_FLUSH_ROUNDS,
                "jobs still pending after flush_all; a job keeps re-queuing itself"
            );
        }
        report
    }

    /// Current flush state.
    pub fn state(&self) -> FlushState {
        self.inner.state.get()
    }

    /// Number of jobs waiting for the next flush.
    pub fn pending(&self) -> usize {
        self.inner.queue.borrow().len()
    }

    /// Whether a job with this id is waiting for the next flush.
    pub fn is_pending(&self, id: JobId) -> bool {
        self.inner.queue.borrow().contains_key(&id)
    }

    /// Number of non-empty flushes so far.
    pub fn flush_count(&self) -> u64 {
        self.inner.flushes.get()
    }

    fn request_flush(&self) {
        match self.inner.mode {
            FlushMode::Manual => {}
            FlushMode::LocalTask => {
                let weak: Weak<SchedulerInner> = Rc::downgrade(&self.inner);
                tokio::task::spawn_local(async move {
                    if let Some(inner) = weak.upgrade() {
                        Scheduler { inner }.flush();
                    }
                });
            }
        }
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("mode", &self.inner.mode)
            .field("state", &self.state())
            .field("pending", &self.pending())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RenderError;

    fn counting_job(id: JobId, log: &Rc<RefCell<Vec<&'static str>>>, name: &'static str) -> Job {
        let log = Rc::clone(log);
        Job::new(id, move || {
            log.borrow_mut().push(name);
            Ok(())
        })
    }

    #[test]
    fn enqueue_is_idempotent_within_a_batch() {
        let scheduler = Scheduler::new(FlushMode::Manual);
        let log = Rc::new(RefCell::new(Vec::new()));
        let id = JobId::new();

        assert!(scheduler.enqueue(counting_job(id, &log, "a")));
        assert!(!scheduler.enqueue(counting_job(id, &log, "a")));
        assert!(!scheduler.enqueue(counting_job(id, &log, "a")));
        assert_eq!(scheduler.pending(), 1);

        let report = scheduler.flush();
        assert_eq!(report.ran, 1);
        assert_eq!(*log.borrow(), vec!["a"]);
    }

    #[test]
    fn state_machine_transitions() {
        let scheduler = Scheduler::new(FlushMode::Manual);
        let log = Rc::new(RefCell::new(Vec::new()));

        assert_eq!(scheduler.state(), FlushState::Idle);
        scheduler.enqueue(counting_job(JobId::new(), &log, "a"));
        assert_eq!(scheduler.state(), FlushState::FlushPending);
        scheduler.flush();
        assert_eq!(scheduler.state(), FlushState::Idle);
    }

    #[test]
    fn flush_runs_jobs_in_enqueue_order() {
        let scheduler = Scheduler::new(FlushMode::Manual);
        let log = Rc::new(RefCell::new(Vec::new()));

        scheduler.enqueue(counting_job(JobId::new(), &log, "first"));
        scheduler.enqueue(counting_job(JobId::new(), &log, "second"));
        scheduler.enqueue(counting_job(JobId::new(), &log, "third"));
        scheduler.flush();

        assert_eq!(*log.borrow(), vec!["first", "second", "third"]);
    }

    #[test]
    fn jobs_enqueued_during_flush_wait_for_next_batch() {
        let scheduler = Scheduler::new(FlushMode::Manual);
        let runs = Rc::new(Cell::new(0));
        let id = JobId::new();

        let slot: Rc<RefCell<Option<Job>>> = Rc::new(RefCell::new(None));
        let job = {
            let scheduler = scheduler.clone();
            let runs = Rc::clone(&runs);
            let slot = Rc::clone(&slot);
            Job::new(id, move || {
                runs.set(runs.get() + 1);
                let again = slot.borrow().clone();
                if let Some(again) = again {
                    scheduler.enqueue(again);
                }
                Ok(())
            })
        };
        *slot.borrow_mut() = Some(job.clone());
        scheduler.enqueue(job);

        scheduler.flush();
        assert_eq!(runs.get(), 1);
        assert_eq!(scheduler.pending(), 1);
        assert_eq!(scheduler.state(), FlushState::FlushPending);

        scheduler.flush();
        assert_eq!(runs.get(), 2);

        // Break the self-reference so the job can be dropped.
        slot.borrow_mut().take();
    }

    #[test]
    fn flush_all_drains_follow_up_batches() {
        let scheduler = Scheduler::new(FlushMode::Manual);
        let log = Rc::new(RefCell::new(Vec::new()));

        let child = counting_job(JobId::new(), &log, "child");
        let parent = {
            let scheduler = scheduler.clone();
            let log = Rc::clone(&log);
            Job::new(JobId::new(), move || {
                log.borrow_mut().push("parent");
                scheduler.enqueue(child.clone());
                Ok(())
            })
        };
        scheduler.enqueue(parent);

        let report = scheduler.flush_all();
        assert_eq!(report.ran, 2);
        assert_eq!(*log.borrow(), vec!["parent", "child"]);
        assert_eq!(scheduler.flush_count(), 2);
        assert_eq!(scheduler.state(), FlushState::Idle);
    }

    #[test]
    fn flush_all_gives_up_on_a_self_requeuing_job() {
        let scheduler = Scheduler::new(FlushMode::Manual);
        let id = JobId::new();
        let slot: Rc<RefCell<Option<Job>>> = Rc::new(RefCell::new(None));
        let job = {
            let scheduler = scheduler.clone();
            let slot = Rc::clone(&slot);
            Job::new(id, move || {
                let again = slot.borrow().clone();
                if let Some(again) = again {
                    scheduler.enqueue(again);
                }
                Ok(())
            })
        };
        *slot.borrow_mut() = Some(job.clone());
        scheduler.enqueue(job);

        let report = scheduler.flush_all();
        assert_eq!(report.ran, MAX_FLUSH_ROUNDS);
        assert!(scheduler.is_pending(id));

        slot.borrow_mut().take();
    }

    #[test]
    fn failing_job_does_not_abort_the_batch() {
        let scheduler = Scheduler::new(FlushMode::Manual);
        let log = Rc::new(RefCell::new(Vec::new()));
        let failing = JobId::new();

        scheduler.enqueue(counting_job(JobId::new(), &log, "before"));
        scheduler.enqueue(Job::new(failing, || Err(RenderError::RendererDropped.into())));
        scheduler.enqueue(counting_job(JobId::new(), &log, "after"));

        let report = scheduler.flush();
        assert_eq!(report.ran, 3);
        assert!(!report.is_ok());
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, failing);
        assert_eq!(*log.borrow(), vec!["before", "after"]);
    }

    #[test]
    fn after_flush_hook_runs() {
        let scheduler = Scheduler::new(FlushMode::Manual);
        let calls = Rc::new(Cell::new(0));
        let calls_hook = Rc::clone(&calls);
        scheduler.set_after_flush(Rc::new(move || calls_hook.set(calls_hook.get() + 1)));

        scheduler.flush();
        assert_eq!(calls.get(), 1);
    }
}
