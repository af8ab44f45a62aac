//! Muninn error types

use std::time::Duration;

/// Muninn error types
#[derive(Debug, thiserror::Error)]
pub enum MuninnError {
    // Caller errors
    #[error("validation error: {0}")]
    Validation(String),

    #[error("simulation not found: {0}")]
    SimulationNotFound(String),

    /// Batch existence check found one or more missing ids.
    #[error("simulations not found: {}", ids.join(", "))]
    SimulationsNotFound { ids: Vec<String> },

    #[error("tool not found: {0}")]
    ToolNotFound(String),

    // Database errors
    #[error("database error: {0}")]
    Database(String),

    #[error("query exceeded timeout of {}s", timeout.as_secs())]
    QueryTimeout { timeout: Duration },

    /// All pooled sessions were leased and none freed up within the
    /// configured acquisition window.
    #[error("session pool exhausted after waiting {}ms", waited.as_millis())]
    PoolExhausted { waited: Duration },

    // Resilience errors
    #[error("circuit breaker '{name}' is open, retry after {}s", retry_after.as_secs())]
    CircuitOpen { name: String, retry_after: Duration },

    // Configuration errors
    #[error("configuration error: {0}")]
    Configuration(String),

    // Anything unanticipated (task join failures, panicking query closures)
    #[error("internal error: {0}")]
    Internal(String),
}

impl MuninnError {
    /// Stable error kind string surfaced in
    /// [`InvocationResult`](crate::exec::InvocationResult) envelopes.
    /// Callers match on these, so they never change.
    pub fn kind(&self) -> &'static str {
        match self {
            MuninnError::Validation(_) => "ValidationError",
            MuninnError::SimulationNotFound(_) | MuninnError::SimulationsNotFound { .. } => {
                "NotFoundError"
            }
            MuninnError::ToolNotFound(_) => "ToolNotFoundError",
            MuninnError::Database(_) | MuninnError::PoolExhausted { .. } => "DatabaseError",
            MuninnError::QueryTimeout { .. } => "QueryTimeoutError",
            MuninnError::CircuitOpen { .. } => "CircuitOpenError",
            MuninnError::Configuration(_) => "ConfigurationError",
            MuninnError::Internal(_) => "InternalError",
        }
    }

    /// Whether this outcome counts toward the circuit breaker's failure
    /// threshold. Only errors that indicate the database itself is unhealthy
    /// qualify; validation and not-found outcomes never reach the breaker,
    /// and a not-found raised inside a query closure means the database
    /// answered.
    pub fn counts_as_breaker_failure(&self) -> bool {
        matches!(
            self,
            MuninnError::Database(_)
                | MuninnError::QueryTimeout { .. }
                | MuninnError::PoolExhausted { .. }
        )
    }

    /// Structured detail payload for error envelopes, where one exists.
    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            MuninnError::SimulationNotFound(id) => {
                Some(serde_json::json!({ "simulation_id": id }))
            }
            MuninnError::SimulationsNotFound { ids } => {
                Some(serde_json::json!({ "missing": ids }))
            }
            MuninnError::QueryTimeout { timeout } => {
                Some(serde_json::json!({ "timeout_secs": timeout.as_secs() }))
            }
            MuninnError::CircuitOpen { retry_after, .. } => {
                Some(serde_json::json!({ "retry_after_secs": retry_after.as_secs() }))
            }
            MuninnError::PoolExhausted { waited } => {
                Some(serde_json::json!({ "waited_ms": waited.as_millis() as u64 }))
            }
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for MuninnError {
    fn from(err: rusqlite::Error) -> Self {
        MuninnError::Database(err.to_string())
    }
}

impl From<serde_json::Error> for MuninnError {
    fn from(err: serde_json::Error) -> Self {
        MuninnError::Internal(format!("JSON error: {err}"))
    }
}

/// Result type alias for Muninn operations
pub type Result<T> = std::result::Result<T, MuninnError>;
