//! Ordered handler registry
//!
//! An explicit publish/subscribe point: subscribers register closures,
//! publishers dispatch to every registered handler in subscription
//! order. There is no implicit wiring; the registry itself is the whole
//! mechanism.
//!
//! Two dispatch flavors:
//!
//! - [`HandlerRegistry::raise`] invokes handlers in order and lets the
//!   first panic propagate, skipping the rest;
//! - [`HandlerRegistry::raise_aggregate`] guards every handler and
//!   reports all failures at once, after every handler has run.

use crate::aggregate::{panic_message, AggregateError, Failure};
use parking_lot::Mutex;
use std::convert::Infallible;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// All failures captured by one guarded dispatch. Handlers have no
/// return value, so every entry is a panic capture.
pub type DispatchError = AggregateError<Infallible>;

/// Identifies a subscription for later removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

type Handler<A> = Arc<dyn Fn(&A) + Send + Sync>;

/// An ordered list of subscribed handlers.
///
/// Cloning produces another handle to the same registry.
pub struct HandlerRegistry<A> {
    handlers: Arc<Mutex<Vec<(HandlerId, Handler<A>)>>>,
    next_id: Arc<AtomicU64>,
}

impl<A> Clone for HandlerRegistry<A> {
    fn clone(&self) -> Self {
        Self {
            handlers: Arc::clone(&self.handlers),
            next_id: Arc::clone(&self.next_id),
        }
    }
}

impl<A> Default for HandlerRegistry<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A> HandlerRegistry<A> {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            handlers: Arc::new(Mutex::new(Vec::new())),
            next_id: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Register a handler. Handlers run in subscription order.
    pub fn subscribe<F>(&self, handler: F) -> HandlerId
    where
        F: Fn(&A) + Send + Sync + 'static,
    {
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers.lock().push((id, Arc::new(handler)));
        id
    }

    /// Remove a handler. Returns false if the id was already gone.
    pub fn unsubscribe(&self, id: HandlerId) -> bool {
        let mut handlers = self.handlers.lock();
        let before = handlers.len();
        handlers.retain(|(hid, _)| *hid != id);
        handlers.len() != before
    }

    /// Number of registered handlers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.lock().len()
    }

    /// True if no handlers are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.lock().is_empty()
    }

    /// Snapshot the handler list so dispatch runs without the lock held;
    /// a handler is then free to subscribe or unsubscribe.
    fn snapshot(&self) -> Vec<Handler<A>> {
        self.handlers
            .lock()
            .iter()
            .map(|(_, h)| Arc::clone(h))
            .collect()
    }

    /// Invoke every handler in subscription order.
    ///
    /// A panicking handler propagates immediately; later handlers do
    /// not run.
    pub fn raise(&self, args: &A) {
        for handler in self.snapshot() {
            handler(args);
        }
    }

    /// Invoke every handler in a guarded scope, collecting failures.
    ///
    /// Every handler runs regardless of earlier failures; the failures
    /// are surfaced together once dispatch is over.
    pub fn raise_aggregate(&self, args: &A) -> Result<(), DispatchError> {
        let mut failures = Vec::new();
        for (position, handler) in self.snapshot().into_iter().enumerate() {
            if let Err(payload) = catch_unwind(AssertUnwindSafe(|| handler(args))) {
                failures.push(Failure::Panic {
                    index: position,
                    message: panic_message(payload.as_ref()),
                });
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(AggregateError::new(failures))
        }
    }
}
