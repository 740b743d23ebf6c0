//! Parallel loop engine
//!
//! Dispatches a work function over an index range or a sequence across
//! the worker pool. The domain is split into contiguous chunks; at most
//! the requested degree of parallelism is in flight at once, and the
//! call returns only after every dispatched chunk has settled.
//!
//! # Early termination
//!
//! Two flavors with different guarantees, exposed through [`LoopState`]:
//!
//! - [`LoopState::stop`] is advisory. Workers avoid *starting* new
//!   iterations once they observe the flag, but nothing is promised
//!   about which indices ran.
//! - [`LoopState::break_at`] lowers a shared break index (it only ever
//!   decreases). Every index strictly below the final break index is
//!   guaranteed to have executed by the time the call returns; indices
//!   at or above it are skipped best-effort.
//!
//! Stop and Break are distinct modes; signalling both in one run leaves
//! the combined outcome unspecified.
//!
//! # Failures
//!
//! A body error or panic never short-circuits the loop: it terminates
//! its own chunk, every other chunk still settles, and all captured
//! failures surface together as one [`AggregateError`].
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use strand_executor::parallel::{ExecOptions, ParallelExecutor};
//! use strand_executor::pool::WorkStealPool;
//!
//! let pool = Arc::new(WorkStealPool::new(4));
//! let executor = ParallelExecutor::new(pool);
//!
//! let squares = executor
//!     .map(0..100, &ExecOptions::ordered(), |i| Ok::<_, ()>(i * i))
//!     .unwrap();
//! assert_eq!(squares[7], 49);
//! ```

use crate::pool::{JobHandle, WorkerPool};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::ops::Range;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use strand_sync::aggregate::{panic_message, AggregateError, Failure};
use strand_sync::cancel::CancelToken;
use tracing::debug;

// ============================================================================
// Options and Loop State
// ============================================================================

/// Options for one parallel run.
#[derive(Clone, Default)]
pub struct ExecOptions {
    /// Maximum chunks in flight at once. Defaults to the pool's worker
    /// count.
    pub parallelism: Option<usize>,
    /// Iterations per chunk. Defaults to a size that yields a few
    /// chunks per worker.
    pub chunk_size: Option<usize>,
    /// Buffer chunk outputs and deliver them in domain order (`map`
    /// only). Costs an extra buffering pass.
    pub ordered: bool,
    /// Cooperative cancellation token, polled by the dispatch loop and
    /// between iterations.
    pub cancel: Option<CancelToken>,
}

impl ExecOptions {
    /// Options with ordered delivery enabled.
    #[must_use]
    pub fn ordered() -> Self {
        Self {
            ordered: true,
            ..Default::default()
        }
    }

    /// Options carrying a cancellation token.
    #[must_use]
    pub fn cancellable(token: CancelToken) -> Self {
        Self {
            cancel: Some(token),
            ..Default::default()
        }
    }
}

const NO_BREAK: usize = usize::MAX;

/// Shared early-termination state for one parallel run.
pub struct LoopState {
    stopped: AtomicBool,
    lowest_break: AtomicUsize,
}

impl LoopState {
    fn new() -> Self {
        Self {
            stopped: AtomicBool::new(false),
            lowest_break: AtomicUsize::new(NO_BREAK),
        }
    }

    /// Request an advisory stop. Monotonic; no completion guarantee is
    /// attached to any index.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
    }

    /// True once a stop has been requested.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Lower the break index to `index` if it is the lowest seen. The
    /// value only ever decreases. Every index strictly below the final
    /// break index will have executed before the run returns.
    pub fn break_at(&self, index: usize) {
        self.lowest_break.fetch_min(index, Ordering::AcqRel);
    }

    /// The lowest break index signalled so far, if any.
    #[must_use]
    pub fn lowest_break_index(&self) -> Option<usize> {
        match self.lowest_break.load(Ordering::Acquire) {
            NO_BREAK => None,
            index => Some(index),
        }
    }

    fn break_bound(&self) -> usize {
        self.lowest_break.load(Ordering::Acquire)
    }
}

/// How a parallel run ended, when no failures were captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopOutcome {
    /// True iff the run was not stopped, broken, or cancelled.
    pub is_complete: bool,
    /// Final break index, if `break_at` was signalled.
    pub lowest_break_index: Option<usize>,
    /// True if the cancellation token fired during the run.
    pub cancelled: bool,
}

// ============================================================================
// Executor
// ============================================================================

/// Fan-out engine over a [`WorkerPool`].
pub struct ParallelExecutor {
    pool: Arc<dyn WorkerPool>,
}

impl ParallelExecutor {
    /// Create an executor dispatching to the given pool.
    #[must_use]
    pub fn new(pool: Arc<dyn WorkerPool>) -> Self {
        Self { pool }
    }

    /// Degree of parallelism and chunk size for a domain of `len`.
    fn plan(&self, opts: &ExecOptions, len: usize) -> (usize, usize) {
        let parallelism = opts
            .parallelism
            .unwrap_or_else(|| self.pool.parallelism())
            .max(1);
        let chunk_size = opts
            .chunk_size
            .unwrap_or_else(|| (len / (parallelism * 4)).max(1));
        (parallelism, chunk_size)
    }

    /// Run `body` for every index in `range`.
    ///
    /// The body receives the index and the shared [`LoopState`]; its
    /// errors and panics are captured per iteration and aggregated. On
    /// success the [`LoopOutcome`] reports how the run ended.
    pub fn for_range<E, F>(
        &self,
        range: Range<usize>,
        opts: &ExecOptions,
        body: F,
    ) -> Result<LoopOutcome, AggregateError<E>>
    where
        F: Fn(usize, &LoopState) -> Result<(), E> + Send + Sync + 'static,
        E: Send + 'static,
    {
        let len = range.len();
        if len == 0 {
            return Ok(LoopOutcome {
                is_complete: true,
                lowest_break_index: None,
                cancelled: false,
            });
        }
        let state = Arc::new(LoopState::new());

        let (parallelism, chunk_size) = self.plan(opts, len);
        debug!(len, parallelism, chunk_size, "dispatching parallel loop");

        let body = Arc::new(body);
        let failures: Arc<Mutex<Vec<Failure<E>>>> = Arc::new(Mutex::new(Vec::new()));
        let mut in_flight: VecDeque<JobHandle> = VecDeque::new();

        let mut chunk_start = range.start;
        while chunk_start < range.end {
            let chunk = chunk_start..range.end.min(chunk_start + chunk_size);
            chunk_start = chunk.end;

            // A broken run must still dispatch every chunk holding
            // indices below the break bound; a stopped or cancelled run
            // dispatches nothing further.
            if chunk.start >= state.break_bound() {
                continue;
            }
            if state.is_stopped() {
                break;
            }
            if opts.cancel.as_ref().is_some_and(CancelToken::is_cancel_requested) {
                break;
            }

            while in_flight.len() >= parallelism {
                if let Some(oldest) = in_flight.pop_front() {
                    oldest.wait();
                }
            }

            let body = Arc::clone(&body);
            let state_for_job = Arc::clone(&state);
            let failures = Arc::clone(&failures);
            let cancel = opts.cancel.clone();
            in_flight.push_back(self.pool.submit(Box::new(move || {
                run_chunk(&chunk, &state_for_job, cancel.as_ref(), &failures, |i, state| {
                    (*body)(i, state)
                });
            })));
        }

        for handle in in_flight {
            handle.wait();
        }

        let failures = std::mem::take(&mut *failures.lock());
        if !failures.is_empty() {
            return Err(AggregateError::new(failures));
        }

        let cancelled = opts.cancel.as_ref().is_some_and(CancelToken::is_cancel_requested);
        let lowest_break_index = state.lowest_break_index();
        Ok(LoopOutcome {
            is_complete: !state.is_stopped() && lowest_break_index.is_none() && !cancelled,
            lowest_break_index,
            cancelled,
        })
    }

    /// Run `body` for every item of `items`.
    ///
    /// Same contract as [`Self::for_range`], with the body also handed
    /// the item at each index.
    pub fn for_each<T, E, F>(
        &self,
        items: Vec<T>,
        opts: &ExecOptions,
        body: F,
    ) -> Result<LoopOutcome, AggregateError<E>>
    where
        T: Send + Sync + 'static,
        F: Fn(usize, &T, &LoopState) -> Result<(), E> + Send + Sync + 'static,
        E: Send + 'static,
    {
        let len = items.len();
        let items = Arc::new(items);
        self.for_range(0..len, opts, move |i, state| body(i, &items[i], state))
    }

    /// Map `f` over `range`, collecting the outputs.
    ///
    /// Each chunk buffers its outputs locally. With `opts.ordered` the
    /// buffers are concatenated in domain order once every chunk has
    /// settled; otherwise they are delivered in completion order. Any
    /// failure makes the whole run fail with the full aggregate. A
    /// cancelled run returns only the outputs of chunks that finished.
    pub fn map<R, E, F>(
        &self,
        range: Range<usize>,
        opts: &ExecOptions,
        f: F,
    ) -> Result<Vec<R>, AggregateError<E>>
    where
        F: Fn(usize) -> Result<R, E> + Send + Sync + 'static,
        R: Send + 'static,
        E: Send + 'static,
    {
        let len = range.len();
        if len == 0 {
            return Ok(Vec::new());
        }

        let (parallelism, chunk_size) = self.plan(opts, len);
        debug!(len, parallelism, chunk_size, ordered = opts.ordered, "dispatching parallel map");

        let f = Arc::new(f);
        let failures: Arc<Mutex<Vec<Failure<E>>>> = Arc::new(Mutex::new(Vec::new()));
        let buffers: Arc<Mutex<Vec<(usize, Vec<R>)>>> = Arc::new(Mutex::new(Vec::new()));
        let mut in_flight: VecDeque<JobHandle> = VecDeque::new();

        let mut chunk_start = range.start;
        while chunk_start < range.end {
            let chunk = chunk_start..range.end.min(chunk_start + chunk_size);
            chunk_start = chunk.end;

            if opts.cancel.as_ref().is_some_and(CancelToken::is_cancel_requested) {
                break;
            }

            while in_flight.len() >= parallelism {
                if let Some(oldest) = in_flight.pop_front() {
                    oldest.wait();
                }
            }

            let f = Arc::clone(&f);
            let failures = Arc::clone(&failures);
            let buffers = Arc::clone(&buffers);
            let cancel = opts.cancel.clone();
            in_flight.push_back(self.pool.submit(Box::new(move || {
                let mut local = Vec::with_capacity(chunk.len());
                let mut failed = false;
                for i in chunk.clone() {
                    if cancel.as_ref().is_some_and(CancelToken::is_cancel_requested) {
                        break;
                    }
                    match catch_unwind(AssertUnwindSafe(|| (*f)(i))) {
                        Ok(Ok(value)) => local.push(value),
                        Ok(Err(error)) => {
                            failures.lock().push(Failure::Err { index: i, error });
                            failed = true;
                            break;
                        }
                        Err(payload) => {
                            failures.lock().push(Failure::Panic {
                                index: i,
                                message: panic_message(payload.as_ref()),
                            });
                            failed = true;
                            break;
                        }
                    }
                }
                if !failed {
                    buffers.lock().push((chunk.start, local));
                }
            })));
        }

        for handle in in_flight {
            handle.wait();
        }

        let failures = std::mem::take(&mut *failures.lock());
        if !failures.is_empty() {
            return Err(AggregateError::new(failures));
        }

        let mut buffers = std::mem::take(&mut *buffers.lock());
        if opts.ordered {
            buffers.sort_by_key(|(start, _)| *start);
        }
        Ok(buffers.into_iter().flat_map(|(_, b)| b).collect())
    }

    /// Run a set of independent actions to completion.
    ///
    /// Every action executes regardless of other actions' failures; all
    /// captured failures surface together, indexed by action position.
    pub fn invoke<E>(
        &self,
        actions: Vec<Box<dyn FnOnce() -> Result<(), E> + Send>>,
    ) -> Result<(), AggregateError<E>>
    where
        E: Send + 'static,
    {
        let failures: Arc<Mutex<Vec<Failure<E>>>> = Arc::new(Mutex::new(Vec::new()));

        let handles: Vec<_> = actions
            .into_iter()
            .enumerate()
            .map(|(index, action)| {
                let failures = Arc::clone(&failures);
                self.pool.submit(Box::new(move || {
                    match catch_unwind(AssertUnwindSafe(action)) {
                        Ok(Ok(())) => {}
                        Ok(Err(error)) => failures.lock().push(Failure::Err { index, error }),
                        Err(payload) => failures.lock().push(Failure::Panic {
                            index,
                            message: panic_message(payload.as_ref()),
                        }),
                    }
                }))
            })
            .collect();

        for handle in handles {
            handle.wait();
        }

        let failures = std::mem::take(&mut *failures.lock());
        if failures.is_empty() {
            Ok(())
        } else {
            Err(AggregateError::new(failures))
        }
    }
}

/// Execute one chunk, honoring stop, break, and cancellation between
/// iterations. A body failure terminates the chunk after being captured.
fn run_chunk<E, F>(
    chunk: &Range<usize>,
    state: &LoopState,
    cancel: Option<&CancelToken>,
    failures: &Mutex<Vec<Failure<E>>>,
    body: F,
) where
    F: Fn(usize, &LoopState) -> Result<(), E>,
{
    for i in chunk.clone() {
        if state.is_stopped() {
            break;
        }
        // Indices at or above the break bound are skipped; the bound
        // only decreases, so everything below the final bound ran.
        if i >= state.break_bound() {
            break;
        }
        if cancel.is_some_and(CancelToken::is_cancel_requested) {
            break;
        }
        match catch_unwind(AssertUnwindSafe(|| body(i, state))) {
            Ok(Ok(())) => {}
            Ok(Err(error)) => {
                failures.lock().push(Failure::Err { index: i, error });
                break;
            }
            Err(payload) => {
                failures.lock().push(Failure::Panic {
                    index: i,
                    message: panic_message(payload.as_ref()),
                });
                break;
            }
        }
    }
}
