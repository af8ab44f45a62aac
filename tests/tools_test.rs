//! Tests for the built-in analytical tools against a seeded fixture
//! database, driven through the registry like a wire layer would.

mod common;

use std::sync::Arc;

use muninn::{MuninnConfig, ToolExecutor, ToolParams, ToolRegistry};
use serde_json::{json, Value};

fn params_of(pairs: &[(&str, Value)]) -> ToolParams {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_owned(), v.clone()))
        .collect()
}

fn registry_for(path: &std::path::Path) -> (Arc<ToolExecutor>, ToolRegistry) {
    let executor = ToolExecutor::new(&MuninnConfig::for_database(path)).unwrap();
    let registry = ToolRegistry::with_defaults(executor.clone());
    (executor, registry)
}

// =========================================================================
// Registry
// =========================================================================

#[tokio::test]
async fn registry_lists_builtin_tools() {
    let (_dir, path) = common::seeded_db();
    let (_executor, registry) = registry_for(&path);

    let names = registry.names();
    for expected in [
        "compare_simulations",
        "get_simulation_info",
        "get_simulation_metrics",
        "health_check",
        "query_actions",
        "query_agents",
        "query_resources",
    ] {
        assert!(names.contains(&expected), "missing tool {expected}");
    }
}

#[tokio::test]
async fn unknown_tool_resolves_to_structured_error() {
    let (_dir, path) = common::seeded_db();
    let (_executor, registry) = registry_for(&path);

    let result = registry.dispatch("no_such_tool", ToolParams::new()).await;
    assert!(!result.success);
    assert_eq!(result.error.unwrap().kind, "ToolNotFoundError");
}

// =========================================================================
// query_agents
// =========================================================================

#[tokio::test]
async fn query_agents_returns_all_for_simulation() {
    let (_dir, path) = common::seeded_db();
    let (_executor, registry) = registry_for(&path);

    let result = registry
        .dispatch(
            "query_agents",
            params_of(&[("simulation_id", json!("sim_001"))]),
        )
        .await;
    assert!(result.success, "error: {:?}", result.error);

    let data = result.data.unwrap();
    assert_eq!(data["total_count"], json!(3));
    assert_eq!(data["returned_count"], json!(3));
    assert_eq!(data["agents"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn query_agents_filters_by_type_and_liveness() {
    let (_dir, path) = common::seeded_db();
    let (_executor, registry) = registry_for(&path);

    let by_type = registry
        .dispatch(
            "query_agents",
            params_of(&[
                ("simulation_id", json!("sim_001")),
                ("agent_type", json!("system")),
            ]),
        )
        .await;
    assert_eq!(by_type.data.unwrap()["total_count"], json!(2));

    let alive = registry
        .dispatch(
            "query_agents",
            params_of(&[
                ("simulation_id", json!("sim_001")),
                ("alive_only", json!(true)),
            ]),
        )
        .await;
    let data = alive.data.unwrap();
    assert_eq!(data["total_count"], json!(2));
    for agent in data["agents"].as_array().unwrap() {
        assert_eq!(agent["death_time"], Value::Null);
    }
}

#[tokio::test]
async fn query_agents_paginates() {
    let (_dir, path) = common::seeded_db();
    let (_executor, registry) = registry_for(&path);

    let page = registry
        .dispatch(
            "query_agents",
            params_of(&[
                ("simulation_id", json!("sim_001")),
                ("limit", json!(2)),
                ("offset", json!(2)),
            ]),
        )
        .await;
    let data = page.data.unwrap();
    assert_eq!(data["total_count"], json!(3));
    assert_eq!(data["returned_count"], json!(1));
}

#[tokio::test]
async fn query_agents_unknown_simulation_is_not_found() {
    let (_dir, path) = common::seeded_db();
    let (_executor, registry) = registry_for(&path);

    let result = registry
        .dispatch(
            "query_agents",
            params_of(&[("simulation_id", json!("sim_404"))]),
        )
        .await;
    assert_eq!(result.error.unwrap().kind, "NotFoundError");
}

#[tokio::test]
async fn query_agents_rejects_out_of_range_limit() {
    let (_dir, path) = common::seeded_db();
    let (_executor, registry) = registry_for(&path);

    for bad_limit in [0, 5000] {
        let result = registry
            .dispatch(
                "query_agents",
                params_of(&[
                    ("simulation_id", json!("sim_001")),
                    ("limit", json!(bad_limit)),
                ]),
            )
            .await;
        assert_eq!(result.error.unwrap().kind, "ValidationError");
    }
}

#[tokio::test]
async fn query_agents_missing_required_param_is_validation_error() {
    let (_dir, path) = common::seeded_db();
    let (_executor, registry) = registry_for(&path);

    let result = registry.dispatch("query_agents", ToolParams::new()).await;
    assert_eq!(result.error.unwrap().kind, "ValidationError");
}

// =========================================================================
// query_actions / query_resources
// =========================================================================

#[tokio::test]
async fn query_actions_filters_by_step_range() {
    let (_dir, path) = common::seeded_db();
    let (_executor, registry) = registry_for(&path);

    let result = registry
        .dispatch(
            "query_actions",
            params_of(&[
                ("simulation_id", json!("sim_001")),
                ("start_step", json!(2)),
            ]),
        )
        .await;
    let data = result.data.unwrap();
    assert_eq!(data["total_count"], json!(1));
    assert_eq!(data["actions"][0]["action_type"], json!("attack"));
    assert_eq!(data["actions"][0]["action_target_id"], json!("agent_2"));
}

#[tokio::test]
async fn query_resources_at_single_step() {
    let (_dir, path) = common::seeded_db();
    let (_executor, registry) = registry_for(&path);

    let result = registry
        .dispatch(
            "query_resources",
            params_of(&[
                ("simulation_id", json!("sim_001")),
                ("step_number", json!(2)),
            ]),
        )
        .await;
    let data = result.data.unwrap();
    assert_eq!(data["total_count"], json!(2));
}

// =========================================================================
// get_simulation_info / get_simulation_metrics
// =========================================================================

#[tokio::test]
async fn simulation_info_parses_parameters_json() {
    let (_dir, path) = common::seeded_db();
    let (_executor, registry) = registry_for(&path);

    let result = registry
        .dispatch(
            "get_simulation_info",
            params_of(&[("simulation_id", json!("sim_001"))]),
        )
        .await;
    let data = result.data.unwrap();
    assert_eq!(data["status"], json!("completed"));
    assert_eq!(data["parameters"]["width"], json!(100));
    assert_eq!(data["results_summary"]["final_agents"], json!(2));
}

#[tokio::test]
async fn simulation_metrics_respect_step_range() {
    let (_dir, path) = common::seeded_db();
    let (_executor, registry) = registry_for(&path);

    let result = registry
        .dispatch(
            "get_simulation_metrics",
            params_of(&[
                ("simulation_id", json!("sim_001")),
                ("start_step", json!(2)),
                ("end_step", json!(3)),
            ]),
        )
        .await;
    let data = result.data.unwrap();
    assert_eq!(data["total_count"], json!(2));
    assert_eq!(data["steps"][0]["step_number"], json!(2));
    assert_eq!(data["steps"][1]["deaths"], json!(1));
}

// =========================================================================
// compare_simulations
// =========================================================================

#[tokio::test]
async fn compare_simulations_reports_stats_and_rankings() {
    let (_dir, path) = common::seeded_db();
    let (_executor, registry) = registry_for(&path);

    let result = registry
        .dispatch(
            "compare_simulations",
            params_of(&[
                ("simulation_ids", json!(["sim_001", "sim_002"])),
                ("metrics", json!(["total_agents", "total_resources"])),
            ]),
        )
        .await;
    assert!(result.success, "error: {:?}", result.error);

    let data = result.data.unwrap();
    assert_eq!(data["simulation_count"], json!(2));

    // sim_001 steps carry total_agents 3, 3, 2.
    let sim1_agents = &data["simulations"]["sim_001"]["total_agents"];
    assert_eq!(sim1_agents["min"], json!(2.0));
    assert_eq!(sim1_agents["max"], json!(3.0));
    assert_eq!(sim1_agents["final"], json!(2.0));
    assert_eq!(sim1_agents["mean"], json!(2.6667));

    // sim_001 averages more agents than sim_002, so it ranks first.
    assert_eq!(
        data["rankings"]["total_agents"][0]["simulation_id"],
        json!("sim_001")
    );

    let pair = &data["pairwise_comparisons"]["sim_001_vs_sim_002"];
    assert!(pair["total_agents"]["mean_difference"].is_number());

    assert_eq!(data["simulation_info"]["sim_002"]["status"], json!("running"));
}

#[tokio::test]
async fn compare_simulations_validates_id_count_and_metrics() {
    let (_dir, path) = common::seeded_db();
    let (_executor, registry) = registry_for(&path);

    let one_id = registry
        .dispatch(
            "compare_simulations",
            params_of(&[("simulation_ids", json!(["sim_001"]))]),
        )
        .await;
    assert_eq!(one_id.error.unwrap().kind, "ValidationError");

    let bad_metric = registry
        .dispatch(
            "compare_simulations",
            params_of(&[
                ("simulation_ids", json!(["sim_001", "sim_002"])),
                ("metrics", json!(["total_agents; DROP TABLE agents"])),
            ]),
        )
        .await;
    assert_eq!(bad_metric.error.unwrap().kind, "ValidationError");
}

#[tokio::test]
async fn compare_simulations_reports_missing_ids() {
    let (_dir, path) = common::seeded_db();
    let (_executor, registry) = registry_for(&path);

    let result = registry
        .dispatch(
            "compare_simulations",
            params_of(&[("simulation_ids", json!(["sim_001", "sim_404"]))]),
        )
        .await;
    let error = result.error.unwrap();
    assert_eq!(error.kind, "NotFoundError");
    assert_eq!(error.details.unwrap()["missing"], json!(["sim_404"]));
}

// =========================================================================
// health_check
// =========================================================================

#[tokio::test]
async fn health_check_reports_components() {
    let (_dir, path) = common::seeded_db();
    let (_executor, registry) = registry_for(&path);

    let result = registry
        .dispatch(
            "health_check",
            params_of(&[("include_details", json!(true))]),
        )
        .await;
    assert!(result.success, "error: {:?}", result.error);

    let data = result.data.unwrap();
    assert_eq!(data["status"], json!("healthy"));
    assert_eq!(data["components"]["database"]["simulation_count"], json!(2));
    assert!(data["components"]["cache"]["stats"]["max_size"].is_number());
    assert_eq!(
        data["components"]["circuit_breaker"]["snapshot"]["state"],
        json!("closed")
    );
    assert!(data["components"]["pool"]["pool_size"].is_number());
}

#[tokio::test]
async fn cached_tool_results_round_trip_through_registry() {
    let (_dir, path) = common::seeded_db();
    let (executor, registry) = registry_for(&path);

    let params = params_of(&[("simulation_id", json!("sim_001"))]);
    let first = registry.dispatch("query_agents", params.clone()).await;
    let second = registry.dispatch("query_agents", params).await;

    assert!(!first.served_from_cache);
    assert!(second.served_from_cache);
    assert_eq!(first.data, second.data);
    assert_eq!(executor.cache_stats().hits, 1);
}
