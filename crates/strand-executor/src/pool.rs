//! Worker pool
//!
//! The boundary the parallel engine dispatches through: jobs go in via
//! [`WorkerPool::submit`], completion comes back through [`JobHandle`]s.
//! [`WorkStealPool`] is the default implementation — a fixed set of
//! worker threads fed by a global injector, with idle workers stealing
//! from their peers.
//!
//! A panicking job never takes a worker down: every job runs under
//! `catch_unwind` and the panic is reported in its [`JobOutcome`].

use crossbeam::deque::{Injector, Stealer, Worker as WorkerDeque};
use parking_lot::{Condvar, Mutex};
use std::cell::Cell;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use strand_sync::aggregate::panic_message;
use tracing::{debug, trace};

// ============================================================================
// Job Handles
// ============================================================================

/// How a submitted job ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// The job ran to completion.
    Completed,
    /// The job panicked; the payload is rendered to text.
    Panicked(String),
}

impl JobOutcome {
    /// True if the job completed without panicking.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

struct JobInner {
    outcome: Mutex<Option<JobOutcome>>,
    condvar: Condvar,
}

/// A handle to a submitted job.
#[derive(Clone)]
pub struct JobHandle {
    inner: Arc<JobInner>,
}

impl JobHandle {
    fn new() -> Self {
        Self {
            inner: Arc::new(JobInner {
                outcome: Mutex::new(None),
                condvar: Condvar::new(),
            }),
        }
    }

    /// Block until the job settles and return its outcome.
    pub fn wait(&self) -> JobOutcome {
        let mut outcome = self.inner.outcome.lock();
        while outcome.is_none() {
            self.inner.condvar.wait(&mut outcome);
        }
        outcome.clone().expect("outcome just observed")
    }

    /// True once the job has settled.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.inner.outcome.lock().is_some()
    }
}

/// Wait for every handle, returning the outcomes in handle order.
pub fn wait_all(handles: &[JobHandle]) -> Vec<JobOutcome> {
    handles.iter().map(JobHandle::wait).collect()
}

// ============================================================================
// Pool Boundary
// ============================================================================

/// The worker-pool boundary consumed by the parallel engine.
///
/// Implementations must execute every submitted job exactly once and
/// settle its handle even when the job panics.
pub trait WorkerPool: Send + Sync {
    /// Submit a job for execution.
    fn submit(&self, job: Box<dyn FnOnce() + Send>) -> JobHandle;

    /// Number of workers available to run jobs concurrently.
    fn parallelism(&self) -> usize;
}

// ============================================================================
// Work-Stealing Pool
// ============================================================================

/// Configuration for [`WorkStealPool`].
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Number of worker threads.
    pub workers: usize,
    /// Stack size for worker threads.
    pub stack_size: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: hardware_parallelism(),
            stack_size: 2 * 1024 * 1024, // 2 MB
        }
    }
}

/// Available hardware parallelism, with a floor of one.
#[must_use]
pub fn hardware_parallelism() -> usize {
    thread::available_parallelism().map(|p| p.get()).unwrap_or(1)
}

struct RawJob {
    func: Box<dyn FnOnce() + Send>,
    inner: Arc<JobInner>,
}

impl RawJob {
    fn run(self) {
        let outcome = match catch_unwind(AssertUnwindSafe(self.func)) {
            Ok(()) => JobOutcome::Completed,
            Err(payload) => JobOutcome::Panicked(panic_message(payload.as_ref())),
        };
        *self.inner.outcome.lock() = Some(outcome);
        self.inner.condvar.notify_all();
    }
}

/// A work-stealing worker pool.
///
/// Workers pull from a global injector and steal from each other's
/// local queues when idle. The pool shuts down by raising a monotonic
/// flag; workers finish their current job and exit.
pub struct WorkStealPool {
    config: PoolConfig,
    injector: Arc<Injector<RawJob>>,
    threads: Vec<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
}

impl WorkStealPool {
    /// Create a pool with the specified number of workers.
    #[must_use]
    pub fn new(workers: usize) -> Self {
        Self::with_config(PoolConfig {
            workers,
            ..Default::default()
        })
    }

    /// Create a pool with the given configuration.
    ///
    /// # Panics
    ///
    /// Panics if `config.workers` is zero or a worker thread cannot be
    /// spawned.
    #[must_use]
    pub fn with_config(config: PoolConfig) -> Self {
        assert!(config.workers > 0, "pool needs at least one worker");

        let injector = Arc::new(Injector::new());
        let shutdown = Arc::new(AtomicBool::new(false));

        let mut local_queues = Vec::with_capacity(config.workers);
        let mut stealers = Vec::with_capacity(config.workers);
        for _ in 0..config.workers {
            let worker = WorkerDeque::new_fifo();
            stealers.push(worker.stealer());
            local_queues.push(worker);
        }
        let stealers = Arc::new(stealers);

        debug!(workers = config.workers, "starting worker pool");

        let mut threads = Vec::with_capacity(config.workers);
        for (id, local) in local_queues.into_iter().enumerate() {
            let injector = Arc::clone(&injector);
            let stealers = Arc::clone(&stealers);
            let shutdown = Arc::clone(&shutdown);

            let handle = thread::Builder::new()
                .name(format!("strand-worker-{id}"))
                .stack_size(config.stack_size)
                .spawn(move || worker_loop(id, &local, &injector, &stealers, &shutdown))
                .expect("failed to spawn worker thread");
            threads.push(handle);
        }

        Self {
            config,
            injector,
            threads,
            shutdown,
        }
    }

    /// Create a pool sized to the available hardware parallelism.
    #[must_use]
    pub fn with_default_config() -> Self {
        Self::with_config(PoolConfig::default())
    }

    /// Shut the pool down and join every worker.
    ///
    /// Jobs already submitted but not yet started are dropped; callers
    /// that need them should `wait_all` first.
    pub fn shutdown(mut self) {
        debug!("shutting down worker pool");
        self.shutdown.store(true, Ordering::Release);
        for handle in std::mem::take(&mut self.threads) {
            let _ = handle.join();
        }
    }
}

impl WorkerPool for WorkStealPool {
    fn submit(&self, job: Box<dyn FnOnce() + Send>) -> JobHandle {
        let handle = JobHandle::new();
        self.injector.push(RawJob {
            func: job,
            inner: Arc::clone(&handle.inner),
        });
        handle
    }

    fn parallelism(&self) -> usize {
        self.config.workers
    }
}

impl Drop for WorkStealPool {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
    }
}

fn worker_loop(
    id: usize,
    local: &WorkerDeque<RawJob>,
    injector: &Injector<RawJob>,
    stealers: &[Stealer<RawJob>],
    shutdown: &AtomicBool,
) {
    CURRENT_WORKER.with(|w| w.set(Some(id)));
    trace!(worker = id, "worker starting");

    loop {
        if shutdown.load(Ordering::Acquire) {
            break;
        }

        if let Some(job) = local.pop() {
            job.run();
            continue;
        }

        if let crossbeam::deque::Steal::Success(job) = injector.steal() {
            job.run();
            continue;
        }

        let mut stole = false;
        for (i, stealer) in stealers.iter().enumerate() {
            if i == id {
                continue;
            }
            if let crossbeam::deque::Steal::Success(job) = stealer.steal() {
                job.run();
                stole = true;
                break;
            }
        }

        if !stole {
            thread::yield_now();
        }
    }

    trace!(worker = id, "worker exiting");
}

// ============================================================================
// Thread-Local Storage
// ============================================================================

thread_local! {
    /// Index of the worker running on this thread, if any.
    static CURRENT_WORKER: Cell<Option<usize>> = const { Cell::new(None) };
}

/// Index of the pool worker executing the current thread, if any.
#[must_use]
pub fn current_worker_id() -> Option<usize> {
    CURRENT_WORKER.with(Cell::get)
}
