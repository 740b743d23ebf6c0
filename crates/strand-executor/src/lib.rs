//! Strand parallel execution engine
//!
//! Fans a work function out over an index range or sequence across a
//! bounded worker pool, with deterministic early-exit semantics.
//!
//! # Features
//!
//! - **Work-stealing pool** - the default [`pool::WorkerPool`] backend
//! - **Chunked dispatch** - contiguous chunks, bounded in-flight count
//! - **Stop/Break** - advisory stop and lower-bound-guaranteed break
//! - **Failure aggregation** - every captured failure surfaces at once
//! - **Cooperative cancellation** - tokens polled at dispatch safe points
//!
//! # Modules
//!
//! - `pool` - Worker-pool boundary and the work-stealing implementation
//! - `parallel` - The parallel loop engine

#![warn(missing_docs)]

pub mod parallel;
pub mod pool;
