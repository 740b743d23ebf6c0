//! Loop Semantics Tests
//!
//! Integration tests for the parallel engine's termination contracts:
//!
//! 1. Break guarantees every index below the final break index executed
//! 2. Stop is advisory and carries no such lower bound
//! 3. Failures are aggregated across chunks, never first-only
//! 4. Ordered map delivery matches domain order
//! 5. Cancellation observed mid-run settles cleanly

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use strand_executor::parallel::{ExecOptions, ParallelExecutor};
use strand_executor::pool::WorkStealPool;
use strand_sync::aggregate::Failure;
use strand_sync::cancel::CancelToken;

fn executor(workers: usize) -> ParallelExecutor {
    ParallelExecutor::new(Arc::new(WorkStealPool::new(workers)))
}

// ============================================================================
// Break: lower-bound completion guarantee
// ============================================================================

#[test]
fn test_break_guarantees_indices_below_bound() {
    let exec = executor(4);
    let n = 2000;
    let executed: Arc<Vec<AtomicBool>> = Arc::new((0..n).map(|_| AtomicBool::new(false)).collect());

    let opts = ExecOptions {
        chunk_size: Some(16),
        ..Default::default()
    };

    let executed_clone = Arc::clone(&executed);
    let outcome = exec
        .for_range(0..n, &opts, move |i, state| {
            executed_clone[i].store(true, Ordering::SeqCst);
            if i == 600 {
                state.break_at(i);
            }
            Ok::<_, ()>(())
        })
        .unwrap();

    assert!(!outcome.is_complete);
    let lowest = outcome
        .lowest_break_index
        .expect("break index must be recorded");
    assert!(lowest <= 600);

    // The contract: everything strictly below the final break index has
    // executed by the time the call returned.
    for i in 0..lowest {
        assert!(
            executed[i].load(Ordering::SeqCst),
            "index {i} below break index {lowest} did not execute"
        );
    }
}

#[test]
fn test_break_at_200_of_500() {
    let exec = executor(4);
    let n = 500;
    let executed: Arc<Vec<AtomicBool>> = Arc::new((0..n).map(|_| AtomicBool::new(false)).collect());

    let opts = ExecOptions {
        chunk_size: Some(8),
        ..Default::default()
    };

    let executed_clone = Arc::clone(&executed);
    let outcome = exec
        .for_range(0..n, &opts, move |i, state| {
            if i == 200 {
                state.break_at(i);
            }
            executed_clone[i].store(true, Ordering::SeqCst);
            Ok::<_, ()>(())
        })
        .unwrap();

    let lowest = outcome.lowest_break_index.unwrap();
    assert!(lowest <= 200);
    for i in 0..lowest {
        assert!(executed[i].load(Ordering::SeqCst));
    }
}

// ============================================================================
// Stop: advisory, no lower bound
// ============================================================================

#[test]
fn test_stop_settles_without_lower_bound() {
    let exec = executor(4);
    let n = 10_000;
    let executed = Arc::new(AtomicUsize::new(0));

    let opts = ExecOptions {
        chunk_size: Some(4),
        ..Default::default()
    };

    let executed_clone = Arc::clone(&executed);
    let outcome = exec
        .for_range(0..n, &opts, move |i, state| {
            if i == 100 {
                state.stop();
            }
            executed_clone.fetch_add(1, Ordering::SeqCst);
            Ok::<_, ()>(())
        })
        .unwrap();

    // No guarantee about which indices ran; only that the run settled
    // and reports itself stopped.
    assert!(!outcome.is_complete);
    assert_eq!(outcome.lowest_break_index, None);
    assert!(executed.load(Ordering::SeqCst) <= n);
}

// ============================================================================
// Failure aggregation across chunks
// ============================================================================

#[test]
fn test_every_chunks_failure_is_reported() {
    let exec = executor(4);
    let opts = ExecOptions {
        chunk_size: Some(5),
        ..Default::default()
    };

    let err = exec
        .for_range(0..500, &opts, |i, _| {
            if i == 7 || i == 205 || i == 402 {
                Err(format!("iteration {i} failed"))
            } else {
                Ok(())
            }
        })
        .unwrap_err();

    let mut indices: Vec<_> = err.failures().iter().map(Failure::index).collect();
    indices.sort_unstable();
    assert_eq!(indices, vec![7, 205, 402]);
}

// ============================================================================
// Ordered delivery
// ============================================================================

#[test]
fn test_ordered_map_with_uneven_final_chunk() {
    let exec = executor(4);
    let opts = ExecOptions {
        chunk_size: Some(7),
        ordered: true,
        ..Default::default()
    };

    let out = exec
        .map(0..101, &opts, |i| Ok::<_, ()>(i as i64 - 50))
        .unwrap();

    assert_eq!(out.len(), 101);
    for (i, v) in out.iter().enumerate() {
        assert_eq!(*v, i as i64 - 50);
    }
}

// ============================================================================
// Cancellation mid-run
// ============================================================================

#[test]
fn test_cancellation_mid_run_settles() {
    let exec = executor(2);
    let token = CancelToken::new();
    let opts = ExecOptions {
        chunk_size: Some(4),
        cancel: Some(token.clone()),
        ..Default::default()
    };

    let outcome = exec
        .for_range(0..100_000, &opts, move |i, _| {
            if i == 40 {
                // Any holder may request; this worker is one.
                token.request_cancel();
            }
            Ok::<_, ()>(())
        })
        .unwrap();

    assert!(outcome.cancelled);
    assert!(!outcome.is_complete);
}
