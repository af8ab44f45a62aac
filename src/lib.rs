//! Muninn - Resilient cached query gateway for simulation analytics
//!
//! This crate sits between an inbound tool call and a simulation database:
//! every named, parameterized, read-only operation is validated, served from
//! a TTL + LRU cache when possible, and otherwise executed through a circuit
//! breaker and a bounded session pool, so a slow or unavailable database
//! degrades into fast structured errors instead of cascading failure.
//!
//! # Example
//!
//! ```rust,no_run
//! use muninn::{MuninnConfig, ToolExecutor, ToolRegistry};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> muninn::Result<()> {
//!     let config = MuninnConfig::for_database("simulation.db");
//!     let executor = ToolExecutor::new(&config)?;
//!     let registry = ToolRegistry::with_defaults(executor);
//!
//!     let params = [
//!         ("simulation_id".to_owned(), json!("sim_001")),
//!         ("alive_only".to_owned(), json!(true)),
//!     ]
//!     .into_iter()
//!     .collect();
//!
//!     let result = registry.dispatch("query_agents", params).await;
//!     if result.success {
//!         println!("{}", serde_json::to_string_pretty(&result)?);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Direct invocation
//!
//! Custom operations can call the execution facade directly with any query
//! closure; the caching, circuit-breaking, and envelope contract is the
//! same:
//!
//! ```rust,ignore
//! let result = executor
//!     .invoke("count_agents", &params, |conn| {
//!         let n: i64 = conn.query_row("SELECT COUNT(*) FROM agents", [], |r| r.get(0))?;
//!         Ok(serde_json::json!({ "count": n }))
//!     })
//!     .await;
//! ```

pub mod breaker;
pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod exec;
pub mod telemetry;
pub mod tools;

// Re-export main types at crate root
pub use breaker::{BreakerSnapshot, CircuitBreaker, CircuitState};
pub use cache::{CacheStats, QueryCache};
pub use config::{BreakerConfig, CacheConfig, DatabaseConfig, MuninnConfig, ServerConfig};
pub use db::{PoolStats, SessionPool};
pub use error::{MuninnError, Result};
pub use exec::{ErrorInfo, InvocationResult, ToolExecutor, ToolParams};
pub use tools::{Tool, ToolRegistry};
