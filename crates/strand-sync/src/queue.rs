//! Non-blocking concurrent FIFO queue
//!
//! Unlike the bounded channel, none of these operations ever block:
//! `push` always succeeds and the `try_` accessors report absence
//! immediately.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

/// A thread-safe FIFO queue.
///
/// Cloning produces another handle to the same queue.
pub struct ConcurrentQueue<T> {
    items: Arc<Mutex<VecDeque<T>>>,
}

impl<T> Clone for ConcurrentQueue<T> {
    fn clone(&self) -> Self {
        Self {
            items: Arc::clone(&self.items),
        }
    }
}

impl<T> Default for ConcurrentQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ConcurrentQueue<T> {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self {
            items: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    /// Append an item to the back of the queue. Always succeeds.
    pub fn push(&self, item: T) {
        self.items.lock().push_back(item);
    }

    /// Remove and return the front item, if any.
    pub fn try_pop(&self) -> Option<T> {
        self.items.lock().pop_front()
    }

    /// Number of items currently queued.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    /// True if the queue holds no items.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }
}

impl<T: Clone> ConcurrentQueue<T> {
    /// Return a copy of the front item without removing it.
    pub fn try_peek(&self) -> Option<T> {
        self.items.lock().front().cloned()
    }
}
