//! Cross-simulation comparison.
//!
//! Aggregates per-step metrics for several simulations side by side:
//! per-metric descriptive statistics, pairwise mean differences, and a
//! ranking per metric. All referenced simulations are existence-checked in
//! one batch query by the executor before any aggregation runs.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use super::{parse_params, Tool};
use crate::exec::{InvocationResult, ToolExecutor, ToolParams};
use crate::MuninnError;

/// Metrics that may be compared. Names double as `simulation_steps` columns,
/// so anything outside this list is rejected before it can reach the SQL
/// text.
const ALLOWED_METRICS: &[&str] = &[
    "total_agents",
    "system_agents",
    "independent_agents",
    "control_agents",
    "total_resources",
    "average_agent_resources",
    "births",
    "deaths",
    "average_agent_health",
    "average_reward",
    "combat_encounters",
    "successful_attacks",
    "genetic_diversity",
];

const DEFAULT_METRICS: &[&str] = &[
    "total_agents",
    "average_agent_health",
    "average_reward",
    "births",
    "deaths",
];

#[derive(Debug, Deserialize)]
struct CompareSimulationsParams {
    simulation_ids: Vec<String>,
    #[serde(default)]
    metrics: Option<Vec<String>>,
}

/// Compare metrics across multiple simulations.
pub struct CompareSimulationsTool {
    executor: Arc<ToolExecutor>,
}

impl CompareSimulationsTool {
    pub fn new(executor: Arc<ToolExecutor>) -> Self {
        Self { executor }
    }
}

#[async_trait]
impl Tool for CompareSimulationsTool {
    fn name(&self) -> &'static str {
        "compare_simulations"
    }

    fn description(&self) -> &'static str {
        "Compare per-step metrics across 2-10 simulations: descriptive \
         statistics per simulation, pairwise mean differences, and a \
         ranking per metric."
    }

    async fn call(&self, params: ToolParams) -> InvocationResult {
        let p: CompareSimulationsParams = match parse_params(&params).and_then(|p| validate(p)) {
            Ok(p) => p,
            Err(err) => return InvocationResult::failure(self.name(), &err, 0.0),
        };

        let metrics: Vec<String> = p
            .metrics
            .unwrap_or_else(|| DEFAULT_METRICS.iter().map(|m| (*m).to_owned()).collect());
        let sim_ids = p.simulation_ids;

        self.executor
            .invoke(self.name(), &params, move |conn| {
                let mut simulations = Map::new();
                let mut simulation_info = Map::new();
                // sim -> metric -> mean, for pairwise diffs and rankings
                let mut means: BTreeMap<String, BTreeMap<String, f64>> = BTreeMap::new();

                for sim_id in &sim_ids {
                    let (status, parameters) = conn.query_row(
                        "SELECT status, parameters FROM simulations WHERE simulation_id = ?1",
                        [sim_id],
                        |row| {
                            Ok((
                                row.get::<_, Option<String>>(0)?,
                                row.get::<_, Option<String>>(1)?,
                            ))
                        },
                    )?;
                    simulation_info.insert(
                        sim_id.clone(),
                        json!({
                            "status": status,
                            "parameters": parameters
                                .and_then(|raw| serde_json::from_str::<Value>(&raw).ok()),
                        }),
                    );

                    let series = metric_series(conn, sim_id, &metrics)?;
                    let mut sim_stats = Map::new();
                    for metric in &metrics {
                        let values = &series[metric.as_str()];
                        match summarize(values) {
                            Some(summary) => {
                                means
                                    .entry(sim_id.clone())
                                    .or_default()
                                    .insert(metric.clone(), mean_of(values));
                                sim_stats.insert(metric.clone(), summary);
                            }
                            None => {
                                sim_stats.insert(metric.clone(), Value::Null);
                            }
                        }
                    }
                    simulations.insert(sim_id.clone(), Value::Object(sim_stats));
                }

                let comparisons = pairwise_differences(&sim_ids, &metrics, &means);
                let rankings = rank_simulations(&metrics, &means);

                Ok(json!({
                    "simulations": simulations,
                    "simulation_info": simulation_info,
                    "pairwise_comparisons": comparisons,
                    "rankings": rankings,
                    "metrics_compared": metrics,
                    "simulation_count": sim_ids.len(),
                }))
            })
            .await
    }
}

fn validate(p: CompareSimulationsParams) -> crate::Result<CompareSimulationsParams> {
    if p.simulation_ids.len() < 2 || p.simulation_ids.len() > 10 {
        return Err(MuninnError::Validation(format!(
            "simulation_ids must contain between 2 and 10 ids, got {}",
            p.simulation_ids.len()
        )));
    }
    if let Some(metrics) = &p.metrics {
        if metrics.is_empty() {
            return Err(MuninnError::Validation(
                "metrics must not be empty when provided".into(),
            ));
        }
        for metric in metrics {
            if !ALLOWED_METRICS.contains(&metric.as_str()) {
                return Err(MuninnError::Validation(format!(
                    "unknown metric {metric:?}; expected one of: {}",
                    ALLOWED_METRICS.join(", ")
                )));
            }
        }
    }
    Ok(p)
}

/// Pull the per-step series for each requested metric, step-ordered,
/// nulls skipped.
fn metric_series<'m>(
    conn: &rusqlite::Connection,
    sim_id: &str,
    metrics: &'m [String],
) -> crate::Result<BTreeMap<&'m str, Vec<f64>>> {
    let columns = metrics.join(", ");
    let sql = format!(
        "SELECT {columns} FROM simulation_steps \
         WHERE simulation_id = ?1 ORDER BY step_number"
    );
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([sim_id])?;

    let mut series: BTreeMap<&str, Vec<f64>> =
        metrics.iter().map(|m| (m.as_str(), Vec::new())).collect();
    while let Some(row) = rows.next()? {
        for (idx, metric) in metrics.iter().enumerate() {
            if let Some(value) = row.get::<_, Option<f64>>(idx)? {
                series
                    .get_mut(metric.as_str())
                    .expect("series keyed by metrics")
                    .push(value);
            }
        }
    }
    Ok(series)
}

fn mean_of(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Descriptive statistics over a step series; `None` when no steps carried
/// the metric.
fn summarize(values: &[f64]) -> Option<Value> {
    if values.is_empty() {
        return None;
    }
    let mean = mean_of(values);
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    Some(json!({
        "mean": round(mean, 4),
        "std": round(variance.sqrt(), 4),
        "min": min,
        "max": max,
        "initial": values[0],
        "final": values[values.len() - 1],
    }))
}

fn pairwise_differences(
    sim_ids: &[String],
    metrics: &[String],
    means: &BTreeMap<String, BTreeMap<String, f64>>,
) -> Value {
    let mut differences = Map::new();
    for (i, sim1) in sim_ids.iter().enumerate() {
        for sim2 in &sim_ids[i + 1..] {
            let mut pair = Map::new();
            for metric in metrics {
                let (Some(m1), Some(m2)) = (
                    means.get(sim1).and_then(|m| m.get(metric)),
                    means.get(sim2).and_then(|m| m.get(metric)),
                ) else {
                    continue;
                };
                let mean_diff = m1 - m2;
                pair.insert(
                    metric.clone(),
                    json!({
                        "mean_difference": round(mean_diff, 4),
                        "percent_difference": if *m2 != 0.0 {
                            Some(round(mean_diff / m2 * 100.0, 2))
                        } else {
                            None
                        },
                    }),
                );
            }
            differences.insert(format!("{sim1}_vs_{sim2}"), Value::Object(pair));
        }
    }
    Value::Object(differences)
}

fn rank_simulations(
    metrics: &[String],
    means: &BTreeMap<String, BTreeMap<String, f64>>,
) -> Value {
    let mut rankings = Map::new();
    for metric in metrics {
        let mut sim_means: Vec<(&str, f64)> = means
            .iter()
            .filter_map(|(sim_id, m)| m.get(metric).map(|mean| (sim_id.as_str(), *mean)))
            .collect();
        sim_means.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        rankings.insert(
            metric.clone(),
            Value::Array(
                sim_means
                    .iter()
                    .enumerate()
                    .map(|(i, (sim_id, value))| {
                        json!({
                            "rank": i + 1,
                            "simulation_id": sim_id,
                            "value": round(*value, 4),
                        })
                    })
                    .collect(),
            ),
        );
    }
    Value::Object(rankings)
}

fn round(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}
