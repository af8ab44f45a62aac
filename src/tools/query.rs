//! Query tools: filtered, paginated reads over a single simulation.
//!
//! Each tool follows the same shape: deserialize the parameter map into a
//! typed struct, then build a filter + aggregate query inside a closure the
//! executor runs under the full invocation contract. Filters are appended
//! as numbered placeholders; user values never reach the SQL text.

use std::sync::Arc;

use async_trait::async_trait;
use rusqlite::types::ToSql;
use rusqlite::Connection;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{default_limit, parse_params, validate_pagination, Tool};
use crate::exec::{InvocationResult, ToolExecutor, ToolParams};
use crate::Result;

/// Run a count + page query over `table` with the accumulated filters.
fn paged_rows(
    conn: &Connection,
    table: &str,
    columns: &str,
    filters: &str,
    order_by: &str,
    mut args: Vec<Box<dyn ToSql>>,
    limit: u32,
    offset: u32,
    map_row: impl Fn(&rusqlite::Row<'_>) -> Result<Value>,
) -> Result<(Vec<Value>, i64)> {
    let count_sql = format!("SELECT COUNT(*) FROM {table} WHERE {filters}");
    let refs: Vec<&dyn ToSql> = args.iter().map(|a| a.as_ref()).collect();
    let total: i64 = conn.query_row(&count_sql, refs.as_slice(), |row| row.get(0))?;

    args.push(Box::new(limit as i64));
    args.push(Box::new(offset as i64));
    let sql = format!(
        "SELECT {columns} FROM {table} WHERE {filters} ORDER BY {order_by} \
         LIMIT ?{} OFFSET ?{}",
        args.len() - 1,
        args.len()
    );
    let refs: Vec<&dyn ToSql> = args.iter().map(|a| a.as_ref()).collect();
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query(refs.as_slice())?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        out.push(map_row(row)?);
    }
    Ok((out, total))
}

// ============================================================================
// query_agents
// ============================================================================

#[derive(Debug, Deserialize)]
struct QueryAgentsParams {
    simulation_id: String,
    #[serde(default)]
    agent_type: Option<String>,
    #[serde(default)]
    generation: Option<i64>,
    #[serde(default)]
    alive_only: bool,
    #[serde(default = "default_limit")]
    limit: u32,
    #[serde(default)]
    offset: u32,
}

/// Query agents from a simulation with flexible filtering.
pub struct QueryAgentsTool {
    executor: Arc<ToolExecutor>,
}

impl QueryAgentsTool {
    pub fn new(executor: Arc<ToolExecutor>) -> Self {
        Self { executor }
    }
}

#[async_trait]
impl Tool for QueryAgentsTool {
    fn name(&self) -> &'static str {
        "query_agents"
    }

    fn description(&self) -> &'static str {
        "Query agents from a simulation, filtered by type, generation, or \
         liveness. Returns identity, lifespan, position, and genome fields, \
         paginated."
    }

    async fn call(&self, params: ToolParams) -> InvocationResult {
        let p: QueryAgentsParams = match parse_params(&params)
            .and_then(|p: QueryAgentsParams| validate_pagination(p.limit).map(|_| p))
        {
            Ok(p) => p,
            Err(err) => return InvocationResult::failure(self.name(), &err, 0.0),
        };

        self.executor
            .invoke(self.name(), &params, move |conn| {
                let mut filters = String::from("simulation_id = ?1");
                let mut args: Vec<Box<dyn ToSql>> = vec![Box::new(p.simulation_id)];
                if let Some(agent_type) = p.agent_type {
                    args.push(Box::new(agent_type));
                    filters.push_str(&format!(" AND agent_type = ?{}", args.len()));
                }
                if let Some(generation) = p.generation {
                    args.push(Box::new(generation));
                    filters.push_str(&format!(" AND generation = ?{}", args.len()));
                }
                if p.alive_only {
                    filters.push_str(" AND death_time IS NULL");
                }

                let (agents, total) = paged_rows(
                    conn,
                    "agents",
                    "agent_id, agent_type, generation, birth_time, death_time, \
                     position_x, position_y, initial_resources, starting_health, \
                     starvation_counter, genome_id",
                    &filters,
                    "agent_id",
                    args,
                    p.limit,
                    p.offset,
                    |row| {
                        Ok(json!({
                            "agent_id": row.get::<_, String>(0)?,
                            "agent_type": row.get::<_, Option<String>>(1)?,
                            "generation": row.get::<_, Option<i64>>(2)?,
                            "birth_time": row.get::<_, Option<i64>>(3)?,
                            "death_time": row.get::<_, Option<i64>>(4)?,
                            "position": {
                                "x": row.get::<_, Option<f64>>(5)?,
                                "y": row.get::<_, Option<f64>>(6)?,
                            },
                            "initial_resources": row.get::<_, Option<f64>>(7)?,
                            "starting_health": row.get::<_, Option<f64>>(8)?,
                            "starvation_counter": row.get::<_, Option<i64>>(9)?,
                            "genome_id": row.get::<_, Option<String>>(10)?,
                        }))
                    },
                )?;

                let returned_count = agents.len();
                Ok(json!({
                    "agents": agents,
                    "total_count": total,
                    "returned_count": returned_count,
                    "limit": p.limit,
                    "offset": p.offset,
                }))
            })
            .await
    }
}

// ============================================================================
// query_actions
// ============================================================================

#[derive(Debug, Deserialize)]
struct QueryActionsParams {
    simulation_id: String,
    #[serde(default)]
    agent_id: Option<String>,
    #[serde(default)]
    action_type: Option<String>,
    #[serde(default)]
    start_step: Option<i64>,
    #[serde(default)]
    end_step: Option<i64>,
    #[serde(default = "default_limit")]
    limit: u32,
    #[serde(default)]
    offset: u32,
}

/// Retrieve action logs from a simulation with filtering.
pub struct QueryActionsTool {
    executor: Arc<ToolExecutor>,
}

impl QueryActionsTool {
    pub fn new(executor: Arc<ToolExecutor>) -> Self {
        Self { executor }
    }
}

#[async_trait]
impl Tool for QueryActionsTool {
    fn name(&self) -> &'static str {
        "query_actions"
    }

    fn description(&self) -> &'static str {
        "Retrieve action logs from a simulation, filtered by agent, action \
         type, or step range. Ordered by step number, paginated."
    }

    async fn call(&self, params: ToolParams) -> InvocationResult {
        let p: QueryActionsParams = match parse_params(&params)
            .and_then(|p: QueryActionsParams| validate_pagination(p.limit).map(|_| p))
        {
            Ok(p) => p,
            Err(err) => return InvocationResult::failure(self.name(), &err, 0.0),
        };

        self.executor
            .invoke(self.name(), &params, move |conn| {
                let mut filters = String::from("simulation_id = ?1");
                let mut args: Vec<Box<dyn ToSql>> = vec![Box::new(p.simulation_id)];
                if let Some(agent_id) = p.agent_id {
                    args.push(Box::new(agent_id));
                    filters.push_str(&format!(" AND agent_id = ?{}", args.len()));
                }
                if let Some(action_type) = p.action_type {
                    args.push(Box::new(action_type));
                    filters.push_str(&format!(" AND action_type = ?{}", args.len()));
                }
                if let Some(start_step) = p.start_step {
                    args.push(Box::new(start_step));
                    filters.push_str(&format!(" AND step_number >= ?{}", args.len()));
                }
                if let Some(end_step) = p.end_step {
                    args.push(Box::new(end_step));
                    filters.push_str(&format!(" AND step_number <= ?{}", args.len()));
                }

                let (actions, total) = paged_rows(
                    conn,
                    "agent_actions",
                    "action_id, step_number, agent_id, action_type, action_target_id, \
                     resources_before, resources_after, reward, details",
                    &filters,
                    "step_number",
                    args,
                    p.limit,
                    p.offset,
                    |row| {
                        Ok(json!({
                            "action_id": row.get::<_, i64>(0)?,
                            "step_number": row.get::<_, i64>(1)?,
                            "agent_id": row.get::<_, String>(2)?,
                            "action_type": row.get::<_, String>(3)?,
                            "action_target_id": row.get::<_, Option<String>>(4)?,
                            "resources_before": row.get::<_, Option<f64>>(5)?,
                            "resources_after": row.get::<_, Option<f64>>(6)?,
                            "reward": row.get::<_, Option<f64>>(7)?,
                            "details": row.get::<_, Option<String>>(8)?,
                        }))
                    },
                )?;

                let returned_count = actions.len();
                Ok(json!({
                    "actions": actions,
                    "total_count": total,
                    "returned_count": returned_count,
                    "limit": p.limit,
                    "offset": p.offset,
                }))
            })
            .await
    }
}

// ============================================================================
// query_resources
// ============================================================================

#[derive(Debug, Deserialize)]
struct QueryResourcesParams {
    simulation_id: String,
    #[serde(default)]
    step_number: Option<i64>,
    #[serde(default)]
    start_step: Option<i64>,
    #[serde(default)]
    end_step: Option<i64>,
    #[serde(default = "default_limit")]
    limit: u32,
    #[serde(default)]
    offset: u32,
}

/// Query resource states by step or step range.
pub struct QueryResourcesTool {
    executor: Arc<ToolExecutor>,
}

impl QueryResourcesTool {
    pub fn new(executor: Arc<ToolExecutor>) -> Self {
        Self { executor }
    }
}

#[async_trait]
impl Tool for QueryResourcesTool {
    fn name(&self) -> &'static str {
        "query_resources"
    }

    fn description(&self) -> &'static str {
        "Query resource states from a simulation at a specific step or over \
         a step range. Returns amounts and positions, paginated."
    }

    async fn call(&self, params: ToolParams) -> InvocationResult {
        let p: QueryResourcesParams = match parse_params(&params)
            .and_then(|p: QueryResourcesParams| validate_pagination(p.limit).map(|_| p))
        {
            Ok(p) => p,
            Err(err) => return InvocationResult::failure(self.name(), &err, 0.0),
        };

        self.executor
            .invoke(self.name(), &params, move |conn| {
                let mut filters = String::from("simulation_id = ?1");
                let mut args: Vec<Box<dyn ToSql>> = vec![Box::new(p.simulation_id)];
                if let Some(step_number) = p.step_number {
                    args.push(Box::new(step_number));
                    filters.push_str(&format!(" AND step_number = ?{}", args.len()));
                }
                if let Some(start_step) = p.start_step {
                    args.push(Box::new(start_step));
                    filters.push_str(&format!(" AND step_number >= ?{}", args.len()));
                }
                if let Some(end_step) = p.end_step {
                    args.push(Box::new(end_step));
                    filters.push_str(&format!(" AND step_number <= ?{}", args.len()));
                }

                let (resources, total) = paged_rows(
                    conn,
                    "resource_states",
                    "resource_id, step_number, amount, position_x, position_y",
                    &filters,
                    "step_number, resource_id",
                    args,
                    p.limit,
                    p.offset,
                    |row| {
                        Ok(json!({
                            "resource_id": row.get::<_, Option<i64>>(0)?,
                            "step_number": row.get::<_, Option<i64>>(1)?,
                            "amount": row.get::<_, Option<f64>>(2)?,
                            "position": {
                                "x": row.get::<_, Option<f64>>(3)?,
                                "y": row.get::<_, Option<f64>>(4)?,
                            },
                        }))
                    },
                )?;

                let returned_count = resources.len();
                Ok(json!({
                    "resources": resources,
                    "total_count": total,
                    "returned_count": returned_count,
                    "limit": p.limit,
                    "offset": p.offset,
                }))
            })
            .await
    }
}

// ============================================================================
// get_simulation_info
// ============================================================================

#[derive(Debug, Deserialize)]
struct SimulationInfoParams {
    simulation_id: String,
}

/// Fetch metadata for a single simulation.
pub struct SimulationInfoTool {
    executor: Arc<ToolExecutor>,
}

impl SimulationInfoTool {
    pub fn new(executor: Arc<ToolExecutor>) -> Self {
        Self { executor }
    }
}

#[async_trait]
impl Tool for SimulationInfoTool {
    fn name(&self) -> &'static str {
        "get_simulation_info"
    }

    fn description(&self) -> &'static str {
        "Fetch metadata for one simulation: status, timing, parameters, and \
         results summary."
    }

    async fn call(&self, params: ToolParams) -> InvocationResult {
        let p: SimulationInfoParams = match parse_params(&params) {
            Ok(p) => p,
            Err(err) => return InvocationResult::failure(self.name(), &err, 0.0),
        };

        self.executor
            .invoke(self.name(), &params, move |conn| {
                let info = conn
                    .query_row(
                        "SELECT simulation_id, experiment_id, status, start_time, end_time, \
                         parameters, results_summary, simulation_db_path \
                         FROM simulations WHERE simulation_id = ?1",
                        [&p.simulation_id],
                        |row| {
                        Ok(json!({
                            "simulation_id": row.get::<_, String>(0)?,
                            "experiment_id": row.get::<_, Option<String>>(1)?,
                            "status": row.get::<_, Option<String>>(2)?,
                            "start_time": row.get::<_, Option<String>>(3)?,
                            "end_time": row.get::<_, Option<String>>(4)?,
                            "parameters": parse_json_column(row.get::<_, Option<String>>(5)?),
                            "results_summary": parse_json_column(row.get::<_, Option<String>>(6)?),
                            "simulation_db_path": row.get::<_, Option<String>>(7)?,
                        }))
                        },
                    )
                    .map_err(|err| match err {
                        rusqlite::Error::QueryReturnedNoRows => {
                            crate::MuninnError::SimulationNotFound(p.simulation_id.clone())
                        }
                        other => other.into(),
                    })?;
                Ok(info)
            })
            .await
    }
}

/// Columns like `parameters` hold serialized JSON; surface them structured
/// when they parse, raw otherwise.
fn parse_json_column(raw: Option<String>) -> Value {
    match raw {
        Some(text) => serde_json::from_str(&text).unwrap_or(Value::String(text)),
        None => Value::Null,
    }
}

// ============================================================================
// get_simulation_metrics
// ============================================================================

#[derive(Debug, Deserialize)]
struct SimulationMetricsParams {
    simulation_id: String,
    #[serde(default)]
    start_step: Option<i64>,
    #[serde(default)]
    end_step: Option<i64>,
    #[serde(default = "default_limit")]
    limit: u32,
    #[serde(default)]
    offset: u32,
}

/// Per-step aggregate metrics over a step range.
pub struct SimulationMetricsTool {
    executor: Arc<ToolExecutor>,
}

impl SimulationMetricsTool {
    pub fn new(executor: Arc<ToolExecutor>) -> Self {
        Self { executor }
    }
}

#[async_trait]
impl Tool for SimulationMetricsTool {
    fn name(&self) -> &'static str {
        "get_simulation_metrics"
    }

    fn description(&self) -> &'static str {
        "Per-step population, resource, and reward metrics for a simulation \
         over an optional step range, paginated."
    }

    async fn call(&self, params: ToolParams) -> InvocationResult {
        let p: SimulationMetricsParams = match parse_params(&params)
            .and_then(|p: SimulationMetricsParams| validate_pagination(p.limit).map(|_| p))
        {
            Ok(p) => p,
            Err(err) => return InvocationResult::failure(self.name(), &err, 0.0),
        };

        self.executor
            .invoke(self.name(), &params, move |conn| {
                let mut filters = String::from("simulation_id = ?1");
                let mut args: Vec<Box<dyn ToSql>> = vec![Box::new(p.simulation_id)];
                if let Some(start_step) = p.start_step {
                    args.push(Box::new(start_step));
                    filters.push_str(&format!(" AND step_number >= ?{}", args.len()));
                }
                if let Some(end_step) = p.end_step {
                    args.push(Box::new(end_step));
                    filters.push_str(&format!(" AND step_number <= ?{}", args.len()));
                }

                let (steps, total) = paged_rows(
                    conn,
                    "simulation_steps",
                    "step_number, total_agents, births, deaths, total_resources, \
                     average_agent_resources, average_agent_health, average_reward, \
                     combat_encounters, successful_attacks, genetic_diversity",
                    &filters,
                    "step_number",
                    args,
                    p.limit,
                    p.offset,
                    |row| {
                        Ok(json!({
                            "step_number": row.get::<_, i64>(0)?,
                            "total_agents": row.get::<_, Option<i64>>(1)?,
                            "births": row.get::<_, Option<i64>>(2)?,
                            "deaths": row.get::<_, Option<i64>>(3)?,
                            "total_resources": row.get::<_, Option<f64>>(4)?,
                            "average_agent_resources": row.get::<_, Option<f64>>(5)?,
                            "average_agent_health": row.get::<_, Option<f64>>(6)?,
                            "average_reward": row.get::<_, Option<f64>>(7)?,
                            "combat_encounters": row.get::<_, Option<i64>>(8)?,
                            "successful_attacks": row.get::<_, Option<i64>>(9)?,
                            "genetic_diversity": row.get::<_, Option<f64>>(10)?,
                        }))
                    },
                )?;

                let returned_count = steps.len();
                Ok(json!({
                    "steps": steps,
                    "total_count": total,
                    "returned_count": returned_count,
                    "limit": p.limit,
                    "offset": p.offset,
                }))
            })
            .await
    }
}
