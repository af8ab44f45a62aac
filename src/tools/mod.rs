//! Analytical tools exposed to the calling agent.
//!
//! Every tool is a named, parameterized, read-only operation: it validates
//! its parameters into a typed struct, then hands a query closure to the
//! [`ToolExecutor`], which owns caching, circuit-breaking, and envelope
//! formatting. Tools never touch the session pool directly.
//!
//! [`ToolRegistry`] maps tool names to implementations for the wire layer
//! (out of scope here) to dispatch against.

pub mod compare;
pub mod health;
pub mod query;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::exec::{InvocationResult, ToolExecutor, ToolParams};
use crate::{MuninnError, Result};

pub use compare::CompareSimulationsTool;
pub use health::HealthCheckTool;
pub use query::{
    QueryActionsTool, QueryAgentsTool, QueryResourcesTool, SimulationInfoTool,
    SimulationMetricsTool,
};

/// A named, parameterized, read-only analytical operation.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Name the tool registers and logs under.
    fn name(&self) -> &'static str;

    /// Description for consumption by the calling agent.
    fn description(&self) -> &'static str;

    /// Validate `params` and execute, always resolving to an envelope.
    async fn call(&self, params: ToolParams) -> InvocationResult;
}

/// Registry of available tools, keyed by name.
pub struct ToolRegistry {
    tools: BTreeMap<&'static str, Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            tools: BTreeMap::new(),
        }
    }

    /// A registry with every built-in tool wired to `executor`.
    pub fn with_defaults(executor: Arc<ToolExecutor>) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(QueryAgentsTool::new(executor.clone())));
        registry.register(Arc::new(QueryActionsTool::new(executor.clone())));
        registry.register(Arc::new(QueryResourcesTool::new(executor.clone())));
        registry.register(Arc::new(SimulationInfoTool::new(executor.clone())));
        registry.register(Arc::new(SimulationMetricsTool::new(executor.clone())));
        registry.register(Arc::new(CompareSimulationsTool::new(executor.clone())));
        registry.register(Arc::new(HealthCheckTool::new(executor)));
        registry
    }

    /// Register a tool, replacing any previous one with the same name.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name(), tool);
    }

    /// Look up a tool by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Registered tool names, sorted.
    pub fn names(&self) -> Vec<&'static str> {
        self.tools.keys().copied().collect()
    }

    /// Dispatch a call by name. An unknown name resolves to a structured
    /// `ToolNotFoundError` envelope, consistent with every other failure.
    pub async fn dispatch(&self, name: &str, params: ToolParams) -> InvocationResult {
        match self.get(name) {
            Some(tool) => tool.call(params).await,
            None => InvocationResult::failure(
                name,
                &MuninnError::ToolNotFound(name.to_owned()),
                0.0,
            ),
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Deserialize the raw parameter map into a tool's typed parameter struct.
///
/// Unknown fields are ignored, missing required fields and type mismatches
/// surface as `ValidationError`.
pub(crate) fn parse_params<T: DeserializeOwned>(params: &ToolParams) -> Result<T> {
    let object: serde_json::Map<String, Value> =
        params.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
    serde_json::from_value(Value::Object(object))
        .map_err(|e| MuninnError::Validation(e.to_string()))
}

/// Shared pagination bounds: limit 1..=1000, offset unrestricted.
pub(crate) fn validate_pagination(limit: u32) -> Result<()> {
    if limit == 0 || limit > 1000 {
        return Err(MuninnError::Validation(format!(
            "limit must be between 1 and 1000, got {limit}"
        )));
    }
    Ok(())
}

pub(crate) fn default_limit() -> u32 {
    100
}
