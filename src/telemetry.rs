//! Telemetry metric name constants.
//!
//! Centralised metric names for muninn operations. Consumers install their
//! own `metrics` recorder (e.g. prometheus, statsd); without a recorder
//! installed, all metric calls are no-ops.
//!
//! # Metric naming conventions
//!
//! All metrics are prefixed with `muninn_`. Counters end in `_total`,
//! histograms use meaningful units (e.g. `_seconds`).
//!
//! # Common labels
//!
//! - `tool` — tool name (e.g. "query_agents", "health_check")
//! - `status` — outcome: "ok" or "error"
//! - `state` — circuit breaker state after a transition

/// Total tool invocations dispatched through the executor.
///
/// Labels: `tool`, `status` ("ok" | "error").
pub const INVOCATIONS_TOTAL: &str = "muninn_invocations_total";

/// Invocation duration in seconds, measured at the executor boundary.
///
/// Labels: `tool`.
pub const INVOCATION_DURATION_SECONDS: &str = "muninn_invocation_duration_seconds";

/// Total query cache hits.
pub const CACHE_HITS_TOTAL: &str = "muninn_cache_hits_total";

/// Total query cache misses (including expired entries).
pub const CACHE_MISSES_TOTAL: &str = "muninn_cache_misses_total";

/// Total query cache evictions (capacity and TTL).
pub const CACHE_EVICTIONS_TOTAL: &str = "muninn_cache_evictions_total";

/// Total circuit breaker state transitions.
///
/// Labels: `state` — the state entered ("open" | "half_open" | "closed").
pub const BREAKER_TRANSITIONS_TOTAL: &str = "muninn_breaker_transitions_total";

/// Total calls rejected by an open circuit without reaching the database.
pub const BREAKER_REJECTIONS_TOTAL: &str = "muninn_breaker_rejections_total";

/// Total sessions discarded because they aged past the recycle lifetime.
pub const SESSIONS_RECYCLED_TOTAL: &str = "muninn_sessions_recycled_total";

/// Total session acquisitions that timed out waiting for a free lease.
pub const POOL_EXHAUSTED_TOTAL: &str = "muninn_pool_exhausted_total";
