//! Circuit breaker guarding the database against cascade failure.
//!
//! A three-state machine: `Closed` (calls pass through), `Open` (calls are
//! rejected immediately), `HalfOpen` (a single trial call probes recovery).
//! The `Open` → `HalfOpen` transition is evaluated lazily at call time once
//! the reset timeout has elapsed — no background timer, so there is exactly
//! one concurrency domain: the one lock below.
//!
//! Every state read and write happens under a single mutex. The half-open
//! "one trial in flight" guarantee is a field inside the same locked struct,
//! so two callers can never both observe open-and-elapsed and both proceed
//! as trials.
//!
//! Which outcomes count as failures is the caller's decision via
//! [`MuninnError::counts_as_breaker_failure`]: a not-found or validation
//! outcome never moves the state machine.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::BreakerConfig;
use crate::telemetry;
use crate::{MuninnError, Result};

/// Circuit breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation, calls pass through.
    Closed,
    /// Too many failures, calls are rejected without reaching the resource.
    Open,
    /// Testing recovery, one trial call permitted at a time.
    HalfOpen,
}

impl CircuitState {
    fn as_str(self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

struct BreakerState {
    state: CircuitState,
    consecutive_failures: u32,
    consecutive_successes: u32,
    last_failure_at: Option<Instant>,
    /// A trial call has been admitted and has not reported its outcome yet.
    trial_in_flight: bool,
}

struct BreakerInner {
    name: String,
    config: BreakerConfig,
    state: Mutex<BreakerState>,
}

/// Thread-safe circuit breaker, one per protected resource.
///
/// Cheap to clone; clones share the same state machine.
#[derive(Clone)]
pub struct CircuitBreaker {
    inner: Arc<BreakerInner>,
}

/// Lock-protected snapshot of the breaker, safe for concurrent polling.
#[derive(Debug, Clone, Serialize)]
pub struct BreakerSnapshot {
    pub name: String,
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
    /// Seconds since the most recent counted failure, if any.
    pub last_failure_age_secs: Option<f64>,
    pub failure_threshold: u32,
    pub reset_timeout_secs: u64,
}

impl CircuitBreaker {
    /// Create a breaker named for the resource it protects.
    pub fn new(name: impl Into<String>, config: BreakerConfig) -> Self {
        Self {
            inner: Arc::new(BreakerInner {
                name: name.into(),
                config,
                state: Mutex::new(BreakerState {
                    state: CircuitState::Closed,
                    consecutive_failures: 0,
                    consecutive_successes: 0,
                    last_failure_at: None,
                    trial_in_flight: false,
                }),
            }),
        }
    }

    /// Execute `operation` under breaker protection.
    ///
    /// While open (and the reset timeout has not elapsed) the operation is
    /// never invoked; the caller gets [`MuninnError::CircuitOpen`]
    /// immediately. Once the timeout elapses the first caller through
    /// becomes the half-open trial; concurrent callers keep failing fast
    /// until the trial reports its outcome.
    pub async fn execute<F, Fut, T>(&self, operation: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let admitted_as_trial = self.admit()?;
        // If the caller's future is dropped mid-trial (e.g. an abandoned
        // timeout race), the guard frees the trial slot so the breaker
        // cannot wedge in half-open forever.
        let mut guard = TrialGuard {
            breaker: self,
            armed: admitted_as_trial,
        };

        let result = operation().await;
        guard.armed = false;

        match &result {
            Ok(_) => self.record_success(),
            Err(err) if err.counts_as_breaker_failure() => self.record_failure(),
            // The resource answered; the error is semantic, not a health
            // signal.
            Err(_) => self.record_success(),
        }
        result
    }

    /// Admit a call, transitioning open → half-open when the reset timeout
    /// has elapsed. Returns whether this caller is the half-open trial.
    fn admit(&self) -> Result<bool> {
        let mut state = self.inner.state.lock();
        match state.state {
            CircuitState::Closed => Ok(false),
            CircuitState::Open => {
                let elapsed = state
                    .last_failure_at
                    .map(|at| at.elapsed())
                    .unwrap_or(Duration::MAX);
                if elapsed >= self.inner.config.reset_timeout() {
                    self.transition(&mut state, CircuitState::HalfOpen);
                    state.consecutive_successes = 0;
                    state.trial_in_flight = true;
                    Ok(true)
                } else {
                    metrics::counter!(telemetry::BREAKER_REJECTIONS_TOTAL).increment(1);
                    Err(self.open_error(elapsed))
                }
            }
            CircuitState::HalfOpen => {
                if state.trial_in_flight {
                    metrics::counter!(telemetry::BREAKER_REJECTIONS_TOTAL).increment(1);
                    Err(self.open_error(Duration::ZERO))
                } else {
                    state.trial_in_flight = true;
                    Ok(true)
                }
            }
        }
    }

    fn record_success(&self) {
        let mut state = self.inner.state.lock();
        state.trial_in_flight = false;
        match state.state {
            CircuitState::Closed => {
                state.consecutive_failures = 0;
                state.consecutive_successes += 1;
            }
            CircuitState::HalfOpen => {
                state.consecutive_failures = 0;
                state.consecutive_successes += 1;
                if state.consecutive_successes >= self.inner.config.success_threshold {
                    self.transition(&mut state, CircuitState::Closed);
                }
            }
            // A straggler finishing after the circuit opened carries no
            // signal about recovery; the trial call decides that.
            CircuitState::Open => {}
        }
    }

    fn record_failure(&self) {
        let mut state = self.inner.state.lock();
        state.trial_in_flight = false;
        match state.state {
            CircuitState::Closed => {
                state.consecutive_failures += 1;
                state.consecutive_successes = 0;
                state.last_failure_at = Some(Instant::now());
                if state.consecutive_failures >= self.inner.config.failure_threshold {
                    self.transition(&mut state, CircuitState::Open);
                }
            }
            CircuitState::HalfOpen => {
                state.consecutive_failures += 1;
                state.consecutive_successes = 0;
                state.last_failure_at = Some(Instant::now());
                self.transition(&mut state, CircuitState::Open);
            }
            // Already open; stragglers must not inflate the counters or
            // push the reset window forward.
            CircuitState::Open => {}
        }
    }

    /// Free an admitted trial slot without recording an outcome.
    fn abandon_trial(&self) {
        let mut state = self.inner.state.lock();
        state.trial_in_flight = false;
    }

    /// Manually force the breaker back to closed.
    pub fn reset(&self) {
        let mut state = self.inner.state.lock();
        info!(breaker = %self.inner.name, "circuit breaker manually reset");
        state.state = CircuitState::Closed;
        state.consecutive_failures = 0;
        state.consecutive_successes = 0;
        state.last_failure_at = None;
        state.trial_in_flight = false;
    }

    /// Lock-protected snapshot for observability polling.
    pub fn snapshot(&self) -> BreakerSnapshot {
        let state = self.inner.state.lock();
        BreakerSnapshot {
            name: self.inner.name.clone(),
            state: state.state,
            consecutive_failures: state.consecutive_failures,
            consecutive_successes: state.consecutive_successes,
            last_failure_age_secs: state.last_failure_at.map(|at| at.elapsed().as_secs_f64()),
            failure_threshold: self.inner.config.failure_threshold,
            reset_timeout_secs: self.inner.config.reset_timeout_secs,
        }
    }

    /// Current state, evaluated without mutating anything.
    pub fn state(&self) -> CircuitState {
        self.inner.state.lock().state
    }

    fn transition(&self, state: &mut BreakerState, to: CircuitState) {
        let from = state.state;
        if from == to {
            return;
        }
        state.state = to;
        metrics::counter!(telemetry::BREAKER_TRANSITIONS_TOTAL, "state" => to.as_str())
            .increment(1);
        match to {
            CircuitState::Open => warn!(
                breaker = %self.inner.name,
                from = from.as_str(),
                consecutive_failures = state.consecutive_failures,
                "circuit breaker opened"
            ),
            CircuitState::HalfOpen => info!(
                breaker = %self.inner.name,
                "circuit breaker half-open, admitting trial call"
            ),
            CircuitState::Closed => info!(
                breaker = %self.inner.name,
                "circuit breaker closed"
            ),
        }
    }

    fn open_error(&self, elapsed: Duration) -> MuninnError {
        let reset = self.inner.config.reset_timeout();
        MuninnError::CircuitOpen {
            name: self.inner.name.clone(),
            retry_after: reset.saturating_sub(elapsed),
        }
    }
}

struct TrialGuard<'a> {
    breaker: &'a CircuitBreaker,
    armed: bool,
}

impl Drop for TrialGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.breaker.abandon_trial();
        }
    }
}
