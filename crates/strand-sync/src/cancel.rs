//! Cooperative cancellation
//!
//! A shared token that work loops poll at safe points. Cancellation is
//! strictly cooperative: requesting it only raises a flag, and the
//! running loop must observe the flag and exit voluntarily. Nothing is
//! ever aborted from outside.
//!
//! Two termination flavors are supported:
//!
//! - **silent**: the loop polls [`CancelToken::is_cancel_requested`] and
//!   simply returns;
//! - **signaling**: the loop calls [`CancelToken::checkpoint`] and lets
//!   the resulting [`Cancelled`] error propagate to the governing caller.
//!
//! # Example
//!
//! ```
//! use strand_sync::cancel::CancelToken;
//!
//! let token = CancelToken::new();
//! let worker = token.clone();
//!
//! let handle = std::thread::spawn(move || {
//!     let mut ticks = 0u64;
//!     loop {
//!         ticks += 1;
//!         if worker.is_cancel_requested() {
//!             worker.acknowledge();
//!             return ticks;
//!         }
//!         std::thread::yield_now();
//!     }
//! });
//!
//! token.request_cancel();
//! assert!(handle.join().unwrap() > 0);
//! ```

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Returned by [`CancelToken::checkpoint`] once cancellation has been
/// observed, for the governing caller to catch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("operation cancelled")]
pub struct Cancelled;

/// Lifecycle of a token.
///
/// ```text
/// Running -> CancelRequested -> Cancelled
/// ```
///
/// Transitions are monotonic; a token never returns to `Running`.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelState {
    /// No cancellation requested.
    Running = 0,
    /// Cancellation requested; the loop has not yet observed it.
    CancelRequested = 1,
    /// The observing loop has acknowledged and unwound.
    Cancelled = 2,
}

/// A shared cancellation flag.
///
/// Cloning produces another handle to the same flag; any holder may
/// request cancellation, and any holder may observe it.
#[derive(Clone)]
pub struct CancelToken {
    state: Arc<AtomicU8>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    /// Create a token in the `Running` state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(AtomicU8::new(CancelState::Running as u8)),
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> CancelState {
        match self.state.load(Ordering::Acquire) {
            0 => CancelState::Running,
            1 => CancelState::CancelRequested,
            _ => CancelState::Cancelled,
        }
    }

    /// Request cancellation. Idempotent: the first call moves the token
    /// out of `Running`; later calls have no effect.
    pub fn request_cancel(&self) {
        let _ = self.state.compare_exchange(
            CancelState::Running as u8,
            CancelState::CancelRequested as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    /// True once cancellation has been requested (or acknowledged).
    #[must_use]
    pub fn is_cancel_requested(&self) -> bool {
        self.state.load(Ordering::Acquire) != CancelState::Running as u8
    }

    /// Mark the request acknowledged: the observing loop calls this as
    /// it unwinds. No effect unless a request is pending.
    pub fn acknowledge(&self) {
        let _ = self.state.compare_exchange(
            CancelState::CancelRequested as u8,
            CancelState::Cancelled as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    /// Signaling-flavor safe point: acknowledges a pending request and
    /// returns `Err(Cancelled)` for the caller to propagate.
    pub fn checkpoint(&self) -> Result<(), Cancelled> {
        if self.is_cancel_requested() {
            self.acknowledge();
            Err(Cancelled)
        } else {
            Ok(())
        }
    }
}
