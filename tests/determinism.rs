//! Integration tests for the replay-divergence contract: call-site
//! divergence detection and early-return detection across two attempts,
//! plus the `IllegalState` contract for using the operation facade
//! outside of an active `run`.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokamak::{DeterminismError, RunFailure};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("tokamak=trace")
        .with_test_writer()
        .try_init();
}

/// Resolves only after a real suspend, forcing the driver to roll back and
/// re-enter the closure at least once.
async fn delayed(ms: u64, value: i32) -> Result<i32, anyhow::Error> {
    tokio::time::sleep(Duration::from_millis(ms)).await;
    Ok(value)
}

#[tokio::test]
async fn s4_call_site_divergence_at_an_earlier_position_is_rejected() {
    init_tracing();
    let attempt = Arc::new(AtomicU32::new(0));

    let result = tokamak::run({
        let attempt = attempt.clone();
        move || {
            let n = attempt.fetch_add(1, Ordering::SeqCst);
            if n == 0 {
                // f(); g(); f();
                tokamak::perform_once!(|| Ok::<_, anyhow::Error>(1))?;
                tokamak::perform_once!(|| Ok::<_, anyhow::Error>(2))?;
                tokamak::perform_once!(|| Ok::<_, anyhow::Error>(3))?;
                let _: i32 = tokamak::await_value!(|| delayed(5, 0))?;
                Ok::<_, tokamak::TokamakError>(0)
            } else {
                // Non-deterministic branch: the first op this attempt is now
                // the call site that previously sat at position 1 (`g`), not
                // position 0 (`f`).
                tokamak::perform_once!(|| Ok::<_, anyhow::Error>(2))?;
                Ok::<_, tokamak::TokamakError>(0)
            }
        }
    })
    .await;

    let err = result.unwrap_err();
    assert!(
        matches!(err, RunFailure::Determinism(DeterminismError::Diverged { .. })),
        "expected a Diverged determinism error, got {err:?}"
    );
    if let RunFailure::Determinism(DeterminismError::Diverged { remaining, .. }) = &err {
        // The prior attempt's remaining trace from the cursor onward must be
        // enumerated in the error message: the three `perform_once!` calls
        // plus the trailing `await_value!` that forced the break/replay.
        assert_eq!(remaining.lines().count(), 4);
    }
}

#[tokio::test]
async fn s5_returning_early_relative_to_a_prior_attempt_is_rejected() {
    init_tracing();
    let attempt = Arc::new(AtomicU32::new(0));

    let result = tokamak::run({
        let attempt = attempt.clone();
        move || {
            let n = attempt.fetch_add(1, Ordering::SeqCst);
            if n == 0 {
                tokamak::perform_once!(|| Ok::<_, anyhow::Error>(1))?;
                tokamak::perform_once!(|| Ok::<_, anyhow::Error>(2))?;
                tokamak::perform_once!(|| Ok::<_, anyhow::Error>(3))?;
                let _: i32 = tokamak::await_value!(|| delayed(5, 0))?;
                Ok::<_, tokamak::TokamakError>(0)
            } else {
                // Returns with none of the prior attempt's operations
                // re-executed.
                Ok::<_, tokamak::TokamakError>(0)
            }
        }
    })
    .await;

    let err = result.unwrap_err();
    assert!(
        matches!(err, RunFailure::Determinism(DeterminismError::EarlyReturn { .. })),
        "expected an EarlyReturn determinism error, got {err:?}"
    );
    if let RunFailure::Determinism(DeterminismError::EarlyReturn { remaining }) = &err {
        // Three `perform_once!` calls plus the trailing `await_value!` that
        // forced the first attempt to break and replay.
        assert_eq!(remaining.lines().count(), 4);
    }
}

#[tokio::test]
async fn revisiting_the_same_call_site_twice_in_a_loop_is_not_a_divergence() {
    init_tracing();
    // A call site inside a loop body is recorded once per iteration, in
    // order; replaying must walk the same sequence of (repeated) call sites
    // rather than flag the repeat as a divergence, and a forced replay (via
    // the trailing await) must not re-invoke any of the loop's memoised
    // closures.
    let invocations = Arc::new(AtomicU32::new(0));

    let result = tokamak::run({
        let invocations = invocations.clone();
        move || {
            let mut total = 0;
            for i in 0..3 {
                let value: i32 = tokamak::perform_once!(|| {
                    invocations.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, anyhow::Error>(i)
                })?;
                total += value;
            }
            let extra: i32 = tokamak::await_value!(|| delayed(5, 10))?;
            Ok::<_, tokamak::TokamakError>(total + extra)
        }
    })
    .await
    .unwrap();

    assert_eq!(result, 0 + 1 + 2 + 10);
    assert_eq!(invocations.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn operation_facade_used_outside_of_run_fails_with_illegal_state() {
    init_tracing();
    let err = tokamak::perform_once!(|| Ok::<_, anyhow::Error>(1)).unwrap_err();
    assert!(err.to_string().contains("outside of an active"));
}
