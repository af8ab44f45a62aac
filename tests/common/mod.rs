//! Shared test fixtures: a scratch simulation database with the schema
//! subset the tools read, plus seed data for two simulations.
#![allow(dead_code)] // each test binary uses a subset of the fixtures

use std::path::PathBuf;

use rusqlite::Connection;
use tempfile::TempDir;

pub const SCHEMA: &str = "
CREATE TABLE simulations (
    simulation_id TEXT PRIMARY KEY,
    experiment_id TEXT,
    start_time TEXT,
    end_time TEXT,
    status TEXT,
    parameters TEXT,
    results_summary TEXT,
    simulation_db_path TEXT
);
CREATE TABLE agents (
    agent_id TEXT PRIMARY KEY,
    simulation_id TEXT,
    birth_time INTEGER,
    death_time INTEGER,
    agent_type TEXT,
    position_x REAL,
    position_y REAL,
    initial_resources REAL,
    starting_health REAL,
    starvation_counter INTEGER,
    genome_id TEXT,
    generation INTEGER
);
CREATE TABLE agent_actions (
    action_id INTEGER PRIMARY KEY,
    simulation_id TEXT,
    step_number INTEGER,
    agent_id TEXT,
    action_type TEXT,
    action_target_id TEXT,
    resources_before REAL,
    resources_after REAL,
    reward REAL,
    details TEXT
);
CREATE TABLE resource_states (
    id INTEGER PRIMARY KEY,
    simulation_id TEXT,
    step_number INTEGER,
    resource_id INTEGER,
    amount REAL,
    position_x REAL,
    position_y REAL
);
CREATE TABLE simulation_steps (
    step_number INTEGER,
    simulation_id TEXT,
    total_agents INTEGER,
    system_agents INTEGER,
    independent_agents INTEGER,
    control_agents INTEGER,
    total_resources REAL,
    average_agent_resources REAL,
    births INTEGER,
    deaths INTEGER,
    average_agent_health REAL,
    average_reward REAL,
    combat_encounters INTEGER,
    successful_attacks INTEGER,
    genetic_diversity REAL
);
";

/// An empty database with the full schema. Keep the `TempDir` alive for the
/// duration of the test; the file vanishes with it.
pub fn empty_db() -> (TempDir, PathBuf) {
    let dir = TempDir::new().expect("create temp dir");
    let path = dir.path().join("simulation.db");
    let conn = Connection::open(&path).expect("create scratch db");
    conn.execute_batch(SCHEMA).expect("apply schema");
    (dir, path)
}

/// A database seeded with two simulations, a handful of agents, actions,
/// resources, and step metrics.
pub fn seeded_db() -> (TempDir, PathBuf) {
    let (dir, path) = empty_db();
    let conn = Connection::open(&path).expect("open scratch db");

    conn.execute_batch(
        r#"
INSERT INTO simulations VALUES
    ('sim_001', 'exp_1', '2025-01-01T00:00:00', '2025-01-01T01:00:00', 'completed',
     '{"width": 100, "seed": 42}', '{"final_agents": 2}', '/data/sim_001.db'),
    ('sim_002', 'exp_1', '2025-01-02T00:00:00', NULL, 'running',
     '{"width": 200, "seed": 43}', NULL, '/data/sim_002.db');

INSERT INTO agents VALUES
    ('agent_1', 'sim_001', 0, NULL,  'system',      1.0, 2.0, 10.0, 100.0, 0, 'genome_a', 0),
    ('agent_2', 'sim_001', 0, 50,    'independent', 3.0, 4.0, 12.0, 100.0, 2, 'genome_b', 0),
    ('agent_3', 'sim_001', 20, NULL, 'system',      5.0, 6.0,  8.0,  90.0, 0, 'genome_a', 1),
    ('agent_4', 'sim_002', 0, NULL,  'control',     0.0, 0.0, 10.0, 100.0, 0, 'genome_c', 0);

INSERT INTO agent_actions VALUES
    (1, 'sim_001', 1, 'agent_1', 'move',   NULL,      10.0, 9.5, 0.1, NULL),
    (2, 'sim_001', 1, 'agent_2', 'gather', NULL,      12.0, 13.0, 0.5, NULL),
    (3, 'sim_001', 2, 'agent_1', 'attack', 'agent_2',  9.5, 9.0, -0.2, 'missed'),
    (4, 'sim_002', 1, 'agent_4', 'move',   NULL,      10.0, 9.8, 0.0, NULL);

INSERT INTO resource_states VALUES
    (1, 'sim_001', 1, 101, 5.0, 1.0, 1.0),
    (2, 'sim_001', 2, 101, 4.0, 1.0, 1.0),
    (3, 'sim_001', 2, 102, 9.0, 7.0, 3.0),
    (4, 'sim_002', 1, 201, 6.0, 2.0, 2.0);

INSERT INTO simulation_steps VALUES
    (1, 'sim_001', 3, 2, 1, 0, 100.0, 10.0, 0, 0, 95.0, 0.2, 0, 0, 0.8),
    (2, 'sim_001', 3, 2, 1, 0,  98.0,  9.5, 0, 0, 94.0, 0.3, 1, 0, 0.8),
    (3, 'sim_001', 2, 1, 1, 0,  95.0,  9.0, 0, 1, 92.0, 0.1, 1, 1, 0.7),
    (1, 'sim_002', 1, 0, 0, 1, 120.0, 10.0, 0, 0, 99.0, 0.0, 0, 0, 1.0),
    (2, 'sim_002', 1, 0, 0, 1, 118.0,  9.8, 0, 0, 98.0, 0.1, 0, 0, 1.0);
"#,
    )
    .expect("seed data");

    (dir, path)
}
