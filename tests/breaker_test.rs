//! Tests for [`CircuitBreaker`] — state machine transitions, fail-fast
//! behaviour, trial calls, and consistency under concurrent load.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use muninn::{BreakerConfig, CircuitBreaker, CircuitState, MuninnError};

fn breaker(failure_threshold: u32, reset_timeout_secs: u64, success_threshold: u32) -> CircuitBreaker {
    CircuitBreaker::new(
        "test",
        BreakerConfig {
            failure_threshold,
            reset_timeout_secs,
            success_threshold,
        },
    )
}

async fn fail(cb: &CircuitBreaker, calls: &Arc<AtomicU32>) -> Result<(), MuninnError> {
    let calls = calls.clone();
    cb.execute(|| async move {
        calls.fetch_add(1, Ordering::SeqCst);
        Err::<(), _>(MuninnError::Database("boom".into()))
    })
    .await
    .map(|_| ())
}

async fn succeed(cb: &CircuitBreaker, calls: &Arc<AtomicU32>) -> Result<i32, MuninnError> {
    let calls = calls.clone();
    cb.execute(|| async move {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok(7)
    })
    .await
}

// =========================================================================
// Closed -> Open
// =========================================================================

#[tokio::test]
async fn opens_after_failure_threshold() {
    let cb = breaker(5, 60, 2);
    let calls = Arc::new(AtomicU32::new(0));

    for _ in 0..5 {
        let _ = fail(&cb, &calls).await;
    }
    assert_eq!(cb.state(), CircuitState::Open);
    assert_eq!(calls.load(Ordering::SeqCst), 5);

    // Sixth call is rejected without invoking the operation.
    let result = fail(&cb, &calls).await;
    assert!(matches!(result, Err(MuninnError::CircuitOpen { .. })));
    assert_eq!(calls.load(Ordering::SeqCst), 5, "operation must not run while open");
}

#[tokio::test]
async fn success_resets_failure_streak_while_closed() {
    let cb = breaker(3, 60, 2);
    let calls = Arc::new(AtomicU32::new(0));

    let _ = fail(&cb, &calls).await;
    let _ = fail(&cb, &calls).await;
    succeed(&cb, &calls).await.unwrap();
    assert_eq!(cb.snapshot().consecutive_failures, 0);

    // Two more failures stay below the threshold again.
    let _ = fail(&cb, &calls).await;
    let _ = fail(&cb, &calls).await;
    assert_eq!(cb.state(), CircuitState::Closed);
}

// =========================================================================
// Open -> HalfOpen -> Closed / Open
// =========================================================================

#[tokio::test]
async fn recovers_through_trial_successes() {
    let cb = breaker(2, 1, 2);
    let calls = Arc::new(AtomicU32::new(0));

    let _ = fail(&cb, &calls).await;
    let _ = fail(&cb, &calls).await;
    assert_eq!(cb.state(), CircuitState::Open);

    tokio::time::sleep(Duration::from_millis(1100)).await;

    // First trial succeeds; threshold is 2, so still half-open.
    succeed(&cb, &calls).await.unwrap();
    assert_eq!(cb.state(), CircuitState::HalfOpen);

    // Second trial success closes the circuit.
    succeed(&cb, &calls).await.unwrap();
    assert_eq!(cb.state(), CircuitState::Closed);
}

#[tokio::test]
async fn trial_failure_reopens_immediately() {
    let cb = breaker(2, 1, 2);
    let calls = Arc::new(AtomicU32::new(0));

    let _ = fail(&cb, &calls).await;
    let _ = fail(&cb, &calls).await;
    tokio::time::sleep(Duration::from_millis(1100)).await;

    let _ = fail(&cb, &calls).await;
    assert_eq!(cb.state(), CircuitState::Open);

    // And the next call is rejected again.
    let before = calls.load(Ordering::SeqCst);
    let result = fail(&cb, &calls).await;
    assert!(matches!(result, Err(MuninnError::CircuitOpen { .. })));
    assert_eq!(calls.load(Ordering::SeqCst), before);
}

// =========================================================================
// Outcome classification
// =========================================================================

#[tokio::test]
async fn not_found_outcomes_do_not_count_as_failures() {
    let cb = breaker(2, 60, 2);

    for _ in 0..10 {
        let result = cb
            .execute(|| async {
                Err::<(), _>(MuninnError::SimulationNotFound("sim_x".into()))
            })
            .await;
        // The error still propagates to the caller.
        assert!(matches!(result, Err(MuninnError::SimulationNotFound(_))));
    }

    assert_eq!(cb.state(), CircuitState::Closed);
    assert_eq!(cb.snapshot().consecutive_failures, 0);
}

#[tokio::test]
async fn timeout_outcomes_count_as_failures() {
    let cb = breaker(2, 60, 2);
    for _ in 0..2 {
        let _ = cb
            .execute(|| async {
                Err::<(), _>(MuninnError::QueryTimeout {
                    timeout: Duration::from_secs(30),
                })
            })
            .await;
    }
    assert_eq!(cb.state(), CircuitState::Open);
}

// =========================================================================
// Manual reset
// =========================================================================

#[tokio::test]
async fn manual_reset_closes_from_any_state() {
    let cb = breaker(1, 60, 2);
    let calls = Arc::new(AtomicU32::new(0));

    let _ = fail(&cb, &calls).await;
    assert_eq!(cb.state(), CircuitState::Open);

    cb.reset();
    assert_eq!(cb.state(), CircuitState::Closed);
    assert_eq!(cb.snapshot().consecutive_failures, 0);

    succeed(&cb, &calls).await.unwrap();
}

// =========================================================================
// Concurrency
// =========================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_failures_leave_consistent_state() {
    let cb = breaker(5, 60, 2);
    let calls = Arc::new(AtomicU32::new(0));

    let mut handles = Vec::new();
    for _ in 0..100 {
        let cb = cb.clone();
        let calls = calls.clone();
        handles.push(tokio::spawn(async move {
            let _ = fail(&cb, &calls).await;
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let snapshot = cb.snapshot();
    assert_eq!(snapshot.state, CircuitState::Open);
    assert_eq!(
        snapshot.consecutive_failures, 5,
        "no lost updates and no overcounting past the threshold"
    );
}

#[tokio::test]
async fn only_one_trial_admitted_while_half_open() {
    let cb = breaker(1, 1, 2);
    let calls = Arc::new(AtomicU32::new(0));

    let _ = fail(&cb, &calls).await;
    tokio::time::sleep(Duration::from_millis(1100)).await;

    // A slow trial holds the half-open slot.
    let cb_trial = cb.clone();
    let trial = tokio::spawn(async move {
        cb_trial
            .execute(|| async {
                tokio::time::sleep(Duration::from_millis(300)).await;
                Ok(1)
            })
            .await
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    // Concurrent caller must fail fast, not run a second trial.
    let before = calls.load(Ordering::SeqCst);
    let result = fail(&cb, &calls).await;
    assert!(matches!(result, Err(MuninnError::CircuitOpen { .. })));
    assert_eq!(calls.load(Ordering::SeqCst), before);

    trial.await.unwrap().unwrap();
}
