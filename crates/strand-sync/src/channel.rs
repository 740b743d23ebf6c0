//! Bounded blocking channel
//!
//! A multi-producer multi-consumer channel with a fixed capacity and a
//! monotonic completion flag. Producers block while the channel is full;
//! consumers block while it is empty. Once a producer side calls
//! [`BoundedChannel::complete`], no further items are accepted, and
//! consumers drain the remaining items before observing the completion
//! signal.
//!
//! The channel can be backed by either a FIFO or a LIFO store; the
//! push/pop/complete contract is identical, only retrieval order differs.
//!
//! # Example
//!
//! ```
//! use strand_sync::channel::BoundedChannel;
//!
//! let chan = BoundedChannel::new(5);
//! let producer = chan.clone();
//!
//! let handle = std::thread::spawn(move || {
//!     for i in 0..10 {
//!         producer.push(i).unwrap();
//!     }
//!     producer.complete();
//! });
//!
//! let mut seen = Vec::new();
//! while let Some(item) = chan.pop() {
//!     seen.push(item);
//! }
//!
//! handle.join().unwrap();
//! assert_eq!(seen, (0..10).collect::<Vec<_>>());
//! assert!(chan.is_completed());
//! ```

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

/// Retrieval order of the channel's backing store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Backing {
    /// First-in-first-out retrieval.
    #[default]
    Fifo,
    /// Most-recently-pushed retrieved first.
    Lifo,
}

/// Error returned by [`BoundedChannel::push`] after completion.
///
/// Carries the rejected item back to the caller.
pub struct ChannelClosed<T>(pub T);

impl<T> fmt::Debug for ChannelClosed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ChannelClosed(..)")
    }
}

impl<T> fmt::Display for ChannelClosed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("channel is closed to new items")
    }
}

impl<T> std::error::Error for ChannelClosed<T> {}

/// Error returned by [`BoundedChannel::try_push`].
pub enum TryPushError<T> {
    /// The channel is at capacity; the item may be pushed later.
    Full(T),
    /// The channel has been completed; no items will ever be accepted.
    Closed(T),
}

impl<T> fmt::Debug for TryPushError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full(_) => f.write_str("Full(..)"),
            Self::Closed(_) => f.write_str("Closed(..)"),
        }
    }
}

/// Error returned by [`BoundedChannel::try_pop`].
///
/// `Empty` is transient; `Completed` is terminal. Neither is an
/// exceptional condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TryPopError {
    /// The channel is empty but not completed; items may still arrive.
    Empty,
    /// The channel is completed and fully drained.
    Completed,
}

/// Backing store: retrieval order is the only difference between variants.
enum Store<T> {
    Fifo(VecDeque<T>),
    Lifo(Vec<T>),
}

impl<T> Store<T> {
    fn new(backing: Backing) -> Self {
        match backing {
            Backing::Fifo => Self::Fifo(VecDeque::new()),
            Backing::Lifo => Self::Lifo(Vec::new()),
        }
    }

    fn push(&mut self, item: T) {
        match self {
            Self::Fifo(q) => q.push_back(item),
            Self::Lifo(s) => s.push(item),
        }
    }

    fn pop(&mut self) -> Option<T> {
        match self {
            Self::Fifo(q) => q.pop_front(),
            Self::Lifo(s) => s.pop(),
        }
    }

    fn len(&self) -> usize {
        match self {
            Self::Fifo(q) => q.len(),
            Self::Lifo(s) => s.len(),
        }
    }
}

struct State<T> {
    store: Store<T>,
    /// Monotonic: set by `complete`, never cleared.
    closed: bool,
}

struct Shared<T> {
    capacity: usize,
    state: Mutex<State<T>>,
    /// Signalled whenever space becomes available or the channel closes.
    space: Condvar,
    /// Signalled whenever an item arrives or the channel closes.
    items: Condvar,
}

/// A bounded blocking MPMC channel with monotonic completion.
///
/// Cloning the channel produces another handle to the same underlying
/// store; any handle may push, pop, or complete.
pub struct BoundedChannel<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for BoundedChannel<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> BoundedChannel<T> {
    /// Create a FIFO-backed channel with the given capacity.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self::with_backing(capacity, Backing::Fifo)
    }

    /// Create a channel with the given capacity and backing order.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    #[must_use]
    pub fn with_backing(capacity: usize, backing: Backing) -> Self {
        assert!(capacity > 0, "channel capacity must be positive");
        Self {
            shared: Arc::new(Shared {
                capacity,
                state: Mutex::new(State {
                    store: Store::new(backing),
                    closed: false,
                }),
                space: Condvar::new(),
                items: Condvar::new(),
            }),
        }
    }

    /// Push an item, blocking while the channel is at capacity.
    ///
    /// Returns `Err(ChannelClosed)` with the item once the channel has
    /// been completed, including when completion happens while this call
    /// is blocked waiting for space.
    pub fn push(&self, item: T) -> Result<(), ChannelClosed<T>> {
        let mut state = self.shared.state.lock();
        loop {
            if state.closed {
                return Err(ChannelClosed(item));
            }
            if state.store.len() < self.shared.capacity {
                break;
            }
            self.shared.space.wait(&mut state);
        }
        state.store.push(item);
        drop(state);
        self.shared.items.notify_one();
        Ok(())
    }

    /// Push an item without blocking.
    pub fn try_push(&self, item: T) -> Result<(), TryPushError<T>> {
        let mut state = self.shared.state.lock();
        if state.closed {
            return Err(TryPushError::Closed(item));
        }
        if state.store.len() >= self.shared.capacity {
            return Err(TryPushError::Full(item));
        }
        state.store.push(item);
        drop(state);
        self.shared.items.notify_one();
        Ok(())
    }

    /// Pop the next item, blocking while the channel is empty and open.
    ///
    /// Returns `None` only once the channel is completed **and** fully
    /// drained; it never returns `None` while items remain.
    pub fn pop(&self) -> Option<T> {
        let mut state = self.shared.state.lock();
        loop {
            if let Some(item) = state.store.pop() {
                drop(state);
                self.shared.space.notify_one();
                return Some(item);
            }
            if state.closed {
                return None;
            }
            self.shared.items.wait(&mut state);
        }
    }

    /// Pop the next item without blocking.
    pub fn try_pop(&self) -> Result<T, TryPopError> {
        let mut state = self.shared.state.lock();
        match state.store.pop() {
            Some(item) => {
                drop(state);
                self.shared.space.notify_one();
                Ok(item)
            }
            None if state.closed => Err(TryPopError::Completed),
            None => Err(TryPopError::Empty),
        }
    }

    /// Mark the channel complete.
    ///
    /// Idempotent. Remaining items stay available to consumers; blocked
    /// producers and consumers are all released.
    pub fn complete(&self) {
        let mut state = self.shared.state.lock();
        state.closed = true;
        drop(state);
        self.shared.space.notify_all();
        self.shared.items.notify_all();
    }

    /// True once the channel is completed and fully drained.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        let state = self.shared.state.lock();
        state.closed && state.store.len() == 0
    }

    /// True once `complete` has been called, drained or not.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shared.state.lock().closed
    }

    /// Number of items currently stored.
    #[must_use]
    pub fn len(&self) -> usize {
        self.shared.state.lock().store.len()
    }

    /// True if no items are currently stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The channel's fixed capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_push_pop_fifo_order() {
        let chan = BoundedChannel::new(4);
        chan.push(1).unwrap();
        chan.push(2).unwrap();
        chan.push(3).unwrap();

        assert_eq!(chan.pop(), Some(1));
        assert_eq!(chan.pop(), Some(2));
        assert_eq!(chan.pop(), Some(3));
    }

    #[test]
    fn test_lifo_backing_reverses_retrieval() {
        let chan = BoundedChannel::with_backing(4, Backing::Lifo);
        chan.push(1).unwrap();
        chan.push(2).unwrap();
        chan.push(3).unwrap();

        assert_eq!(chan.pop(), Some(3));
        assert_eq!(chan.pop(), Some(2));
        assert_eq!(chan.pop(), Some(1));
    }

    #[test]
    fn test_push_after_complete_fails() {
        let chan = BoundedChannel::new(2);
        chan.push(1).unwrap();
        chan.complete();

        let err = chan.push(2).unwrap_err();
        assert_eq!(err.0, 2);

        // Completion is idempotent and does not drain.
        chan.complete();
        assert_eq!(chan.len(), 1);
        assert_eq!(chan.pop(), Some(1));
        assert_eq!(chan.pop(), None);
        assert!(chan.is_completed());
    }

    #[test]
    fn test_try_push_full_and_closed() {
        let chan = BoundedChannel::new(1);
        chan.try_push(1).unwrap();
        assert!(matches!(chan.try_push(2), Err(TryPushError::Full(2))));

        chan.complete();
        assert!(matches!(chan.try_push(3), Err(TryPushError::Closed(3))));
    }

    #[test]
    fn test_try_pop_empty_vs_completed() {
        let chan: BoundedChannel<i32> = BoundedChannel::new(1);
        assert_eq!(chan.try_pop(), Err(TryPopError::Empty));

        chan.complete();
        assert_eq!(chan.try_pop(), Err(TryPopError::Completed));
    }

    #[test]
    fn test_producer_consumer_drains_exactly() {
        let chan = BoundedChannel::new(5);
        let producer = chan.clone();

        let handle = thread::spawn(move || {
            for i in 0..10 {
                producer.push(i).unwrap();
            }
            producer.complete();
        });

        let mut seen = Vec::new();
        while let Some(item) = chan.pop() {
            // Capacity bound holds while draining.
            assert!(chan.len() <= chan.capacity());
            seen.push(item);
        }

        handle.join().unwrap();
        assert_eq!(seen, (0..10).collect::<Vec<_>>());
        assert!(chan.is_completed());
    }

    #[test]
    fn test_producer_blocks_at_capacity() {
        let chan = BoundedChannel::new(2);
        let producer = chan.clone();
        let pushed = Arc::new(AtomicUsize::new(0));
        let pushed_clone = Arc::clone(&pushed);

        let handle = thread::spawn(move || {
            for i in 0..5 {
                producer.push(i).unwrap();
                pushed_clone.fetch_add(1, Ordering::SeqCst);
            }
        });

        // Give the producer time to fill the channel and block.
        thread::sleep(Duration::from_millis(50));
        assert_eq!(pushed.load(Ordering::SeqCst), 2);
        assert_eq!(chan.len(), 2);

        // Draining releases the blocked producer.
        let mut seen = Vec::new();
        for _ in 0..5 {
            seen.push(chan.pop().unwrap());
        }
        handle.join().unwrap();
        assert_eq!(seen, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_complete_releases_blocked_consumer() {
        let chan: BoundedChannel<i32> = BoundedChannel::new(2);
        let consumer = chan.clone();

        let handle = thread::spawn(move || consumer.pop());

        thread::sleep(Duration::from_millis(20));
        chan.complete();

        assert_eq!(handle.join().unwrap(), None);
    }

    #[test]
    fn test_multi_producer_multi_consumer_counts() {
        let chan = BoundedChannel::new(8);
        let per_producer = 100;

        let producers: Vec<_> = (0..4)
            .map(|_| {
                let chan = chan.clone();
                thread::spawn(move || {
                    for i in 0..per_producer {
                        chan.push(i).unwrap();
                    }
                })
            })
            .collect();

        let popped = Arc::new(AtomicUsize::new(0));
        let consumers: Vec<_> = (0..4)
            .map(|_| {
                let chan = chan.clone();
                let popped = Arc::clone(&popped);
                thread::spawn(move || {
                    while chan.pop().is_some() {
                        popped.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();

        for p in producers {
            p.join().unwrap();
        }
        chan.complete();
        for c in consumers {
            c.join().unwrap();
        }

        assert_eq!(popped.load(Ordering::SeqCst), 4 * per_producer);
        assert!(chan.is_completed());
    }
}
