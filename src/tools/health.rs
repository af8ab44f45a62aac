//! Health check exposing the core's observability surface.
//!
//! One tool call reports database reachability plus the three pollable
//! surfaces: cache statistics, circuit breaker snapshot, and pool
//! utilization. Intended for load balancer probes and monitoring, so the
//! payload keeps a stable `status` field: `healthy` / `unhealthy`.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{parse_params, Tool};
use crate::exec::{InvocationResult, ToolExecutor, ToolParams};

#[derive(Debug, Deserialize)]
struct HealthCheckParams {
    #[serde(default)]
    include_details: bool,
}

/// Health check over the gateway and its components.
pub struct HealthCheckTool {
    executor: Arc<ToolExecutor>,
}

impl HealthCheckTool {
    pub fn new(executor: Arc<ToolExecutor>) -> Self {
        Self { executor }
    }
}

#[async_trait]
impl Tool for HealthCheckTool {
    fn name(&self) -> &'static str {
        "health_check"
    }

    fn description(&self) -> &'static str {
        "Check database connectivity and report cache statistics, circuit \
         breaker state, and session pool utilization."
    }

    async fn call(&self, params: ToolParams) -> InvocationResult {
        let p: HealthCheckParams = match parse_params(&params) {
            Ok(p) => p,
            Err(err) => return InvocationResult::failure(self.name(), &err, 0.0),
        };

        // Component stats are read inside the query closure so they reflect
        // the moment the check ran, cached or not.
        let cache = self.executor.cache();
        let breaker = self.executor.breaker();
        let pool = self.executor.pool();

        self.executor
            .invoke(self.name(), &params, move |conn| {
                let simulation_count: i64 =
                    conn.query_row("SELECT COUNT(*) FROM simulations", [], |row| row.get(0))?;

                let cache_stats = cache.stats();
                let mut components: Value = json!({
                    "database": {
                        "status": "healthy",
                        "simulation_count": simulation_count,
                    },
                    "cache": {
                        "status": if cache_stats.enabled { "healthy" } else { "disabled" },
                    },
                    "circuit_breaker": {
                        "status": breaker.snapshot().state,
                    },
                });

                if p.include_details {
                    components["cache"]["stats"] = serde_json::to_value(&cache_stats)?;
                    components["circuit_breaker"]["snapshot"] =
                        serde_json::to_value(breaker.snapshot())?;
                    components["pool"] = serde_json::to_value(pool.stats())?;
                }

                Ok(json!({
                    "status": "healthy",
                    "components": components,
                }))
            })
            .await
    }
}
