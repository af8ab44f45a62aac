//! Execution facade tying validation, caching, circuit-breaking, and result
//! formatting into one invocation contract.
//!
//! Every analytical tool funnels through [`ToolExecutor::invoke`]: compute a
//! cache key, consult the cache, and on a miss run the query closure through
//! the circuit breaker and session pool, cache the result, and wrap
//! everything in an [`InvocationResult`] envelope. Errors of every kind —
//! anticipated or not — come back as structured envelopes; nothing escapes
//! as a raw fault.
//!
//! Foreign-key parameters are validated before the cache is consulted: a
//! `simulation_id` that is *present* is checked for existence even when it
//! is an empty string (presence, not truthiness), and a `simulation_ids`
//! array is checked with a single batch query.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use rusqlite::Connection;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::breaker::{BreakerSnapshot, CircuitBreaker};
use crate::cache::{self, CacheStats, QueryCache};
use crate::config::{MuninnConfig, ServerConfig};
use crate::db::{validate, PoolStats, SessionPool};
use crate::telemetry;
use crate::{MuninnError, Result};

/// Tool parameters: scalar (or shallow array) values keyed by name.
///
/// A `BTreeMap` keeps serialization order total, which the cache key
/// derivation relies on.
pub type ToolParams = BTreeMap<String, Value>;

/// Structured error surfaced in an [`InvocationResult`].
#[derive(Debug, Clone, Serialize)]
pub struct ErrorInfo {
    /// Stable kind string, e.g. `"NotFoundError"` — see
    /// [`MuninnError::kind`].
    pub kind: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

/// The envelope every tool invocation resolves to.
///
/// Exactly one of `data` and `error` is populated, matching `success`.
#[derive(Debug, Clone, Serialize)]
pub struct InvocationResult {
    pub success: bool,
    pub tool: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    pub served_from_cache: bool,
    pub execution_time_ms: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

impl InvocationResult {
    /// Build a success envelope.
    pub fn success(
        tool: &str,
        data: Value,
        served_from_cache: bool,
        execution_time_ms: f64,
    ) -> Self {
        Self {
            success: true,
            tool: tool.to_owned(),
            data: Some(data),
            served_from_cache,
            execution_time_ms,
            error: None,
        }
    }

    /// Build a failure envelope from an error.
    pub fn failure(tool: &str, err: &MuninnError, execution_time_ms: f64) -> Self {
        Self {
            success: false,
            tool: tool.to_owned(),
            data: None,
            served_from_cache: false,
            execution_time_ms,
            error: Some(ErrorInfo {
                kind: err.kind().to_owned(),
                message: err.to_string(),
                details: err.details(),
            }),
        }
    }
}

/// The single entry point tools call through.
pub struct ToolExecutor {
    cache: QueryCache,
    breaker: CircuitBreaker,
    pool: SessionPool,
    server: ServerConfig,
}

impl ToolExecutor {
    /// Build the execution layer from configuration: validates the config,
    /// opens the session pool, and wires up the cache and circuit breaker.
    pub fn new(config: &MuninnConfig) -> Result<Arc<Self>> {
        config.validate()?;
        let pool = SessionPool::connect(&config.database)?;
        Ok(Arc::new(Self {
            cache: QueryCache::new(&config.cache),
            breaker: CircuitBreaker::new("database", config.breaker.clone()),
            pool,
            server: config.server.clone(),
        }))
    }

    /// Invoke a query closure under the full execution contract.
    ///
    /// Never returns a raw error: every failure kind — validation,
    /// not-found, database, timeout, circuit-open, or anything
    /// unanticipated — is folded into the envelope.
    pub async fn invoke<F>(&self, tool_name: &str, params: &ToolParams, query: F) -> InvocationResult
    where
        F: FnOnce(&Connection) -> Result<Value> + Send + 'static,
    {
        let started = Instant::now();
        let outcome = self.try_invoke(tool_name, params, query).await;
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

        metrics::histogram!(
            telemetry::INVOCATION_DURATION_SECONDS,
            "tool" => tool_name.to_owned()
        )
        .record(started.elapsed().as_secs_f64());

        match outcome {
            Ok((data, served_from_cache)) => {
                metrics::counter!(
                    telemetry::INVOCATIONS_TOTAL,
                    "tool" => tool_name.to_owned(),
                    "status" => "ok"
                )
                .increment(1);
                let execution_time_ms = if served_from_cache { 0.0 } else { elapsed_ms };
                info!(
                    tool = tool_name,
                    from_cache = served_from_cache,
                    execution_time_ms,
                    "tool executed"
                );
                InvocationResult::success(tool_name, data, served_from_cache, execution_time_ms)
            }
            Err(err) => {
                metrics::counter!(
                    telemetry::INVOCATIONS_TOTAL,
                    "tool" => tool_name.to_owned(),
                    "status" => "error"
                )
                .increment(1);
                match &err {
                    MuninnError::Validation(_)
                    | MuninnError::SimulationNotFound(_)
                    | MuninnError::SimulationsNotFound { .. } => {
                        warn!(tool = tool_name, error = %err, "tool rejected")
                    }
                    MuninnError::Internal(_) => {
                        error!(tool = tool_name, error = %err, "unexpected tool failure")
                    }
                    _ => error!(tool = tool_name, error = %err, "tool failed"),
                }
                InvocationResult::failure(tool_name, &err, elapsed_ms)
            }
        }
    }

    async fn try_invoke<F>(
        &self,
        tool_name: &str,
        params: &ToolParams,
        query: F,
    ) -> Result<(Value, bool)>
    where
        F: FnOnce(&Connection) -> Result<Value> + Send + 'static,
    {
        self.validate_references(params).await?;

        let key = cache::key_for(tool_name, params);
        if let Some(cached) = self.cache.get(&key) {
            debug!(tool = tool_name, "serving from cache");
            return Ok((cached, true));
        }

        let pool = self.pool.clone();
        let data = self.breaker.execute(|| pool.execute(query)).await?;

        self.cache.set(&key, data.clone());
        Ok((data, false))
    }

    /// Existence checks for foreign-key-style parameters, run before the
    /// cache or the breaker see the call.
    ///
    /// A parameter is validated whenever it is *present* — an empty-string
    /// id is present-and-invalid, not absent. JSON `null` counts as absent,
    /// matching an omitted optional parameter.
    async fn validate_references(&self, params: &ToolParams) -> Result<()> {
        if let Some(value) = params.get("simulation_id") {
            if !value.is_null() {
                let id = value.as_str().ok_or_else(|| {
                    MuninnError::Validation("simulation_id must be a string".into())
                })?;
                if !validate::simulation_exists(&self.pool, id).await? {
                    return Err(MuninnError::SimulationNotFound(id.to_owned()));
                }
            }
        }

        if let Some(value) = params.get("simulation_ids") {
            if !value.is_null() {
                let ids = value
                    .as_array()
                    .ok_or_else(|| {
                        MuninnError::Validation("simulation_ids must be an array".into())
                    })?
                    .iter()
                    .map(|v| {
                        v.as_str().map(str::to_owned).ok_or_else(|| {
                            MuninnError::Validation(
                                "simulation_ids must contain only strings".into(),
                            )
                        })
                    })
                    .collect::<Result<std::collections::BTreeSet<_>>>()?;
                let missing = validate::missing_simulations(&self.pool, &ids).await?;
                if !missing.is_empty() {
                    return Err(MuninnError::SimulationsNotFound {
                        ids: missing.into_iter().collect(),
                    });
                }
            }
        }

        Ok(())
    }

    /// Cache statistics for the observability surface.
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Circuit breaker snapshot for the observability surface.
    pub fn breaker_snapshot(&self) -> BreakerSnapshot {
        self.breaker.snapshot()
    }

    /// Pool utilization for the observability surface.
    pub fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }

    /// Handle to the query cache (shared).
    pub fn cache(&self) -> QueryCache {
        self.cache.clone()
    }

    /// Handle to the circuit breaker (shared).
    pub fn breaker(&self) -> CircuitBreaker {
        self.breaker.clone()
    }

    /// Handle to the session pool (shared).
    pub fn pool(&self) -> SessionPool {
        self.pool.clone()
    }

    /// Result sizing defaults shared by the tools.
    pub fn server_config(&self) -> &ServerConfig {
        &self.server
    }
}
