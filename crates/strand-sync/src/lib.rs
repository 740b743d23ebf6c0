//! Strand synchronization primitives
//!
//! Shared containers and coordination primitives for multi-threaded
//! producers and consumers.
//!
//! # Features
//!
//! - **Bounded channel**: blocking MPMC queue with monotonic completion
//! - **Concurrent containers**: non-blocking queue, bag, and map
//! - **Accumulator**: a shared total with selectable update strategies
//! - **Cancellation**: cooperative tokens polled at safe points
//!
//! # Modules
//!
//! - `channel` - Bounded blocking channel (FIFO or LIFO backed)
//! - `queue` - Non-blocking concurrent FIFO queue
//! - `bag` - Unordered concurrent bag with per-thread shards
//! - `map` - Concurrent map with compare-and-swap updates
//! - `accumulator` - Shared numeric total
//! - `cancel` - Cooperative cancellation tokens
//! - `event` - Ordered handler registry with aggregate dispatch
//! - `aggregate` - Failure collection across concurrent units of work

#![warn(missing_docs)]

pub mod accumulator;
pub mod aggregate;
pub mod bag;
pub mod cancel;
pub mod channel;
pub mod event;
pub mod map;
pub mod queue;
