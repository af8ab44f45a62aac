//! Configuration for the query gateway.
//!
//! All settings are plain scalars grouped per component. Configuration can be
//! built directly, loaded from a TOML file ([`MuninnConfig::load`]), or read
//! from environment variables ([`MuninnConfig::from_env`]). Construction-time
//! validation catches out-of-range values before any component is built.

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::{MuninnError, Result};

/// Top-level gateway configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MuninnConfig {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub breaker: BreakerConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

/// Database and session pool configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the simulation database file.
    pub path: PathBuf,
    /// Base number of pooled sessions retained when idle (default: 5).
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
    /// Transient sessions allowed beyond the base pool under burst load,
    /// discarded on release (default: 2).
    #[serde(default = "default_max_overflow")]
    pub max_overflow: usize,
    /// Maximum seconds to wait for a free session before failing with a
    /// pool-exhaustion error (default: 5).
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_secs: u64,
    /// Maximum seconds a query may run before the caller's wait is
    /// abandoned (default: 30).
    #[serde(default = "default_query_timeout")]
    pub query_timeout_secs: u64,
    /// Sessions older than this many seconds are discarded instead of
    /// reused; 0 disables recycling (default: 1800).
    #[serde(default = "default_max_lifetime")]
    pub max_lifetime_secs: u64,
}

impl DatabaseConfig {
    /// Configuration for a database at `path` with default pool settings.
    pub fn for_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            pool_size: default_pool_size(),
            max_overflow: default_max_overflow(),
            acquire_timeout_secs: default_acquire_timeout(),
            query_timeout_secs: default_query_timeout(),
            max_lifetime_secs: default_max_lifetime(),
        }
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }

    /// `None` when recycling is disabled.
    pub fn max_lifetime(&self) -> Option<Duration> {
        (self.max_lifetime_secs > 0).then(|| Duration::from_secs(self.max_lifetime_secs))
    }
}

fn default_pool_size() -> usize {
    5
}

fn default_max_overflow() -> usize {
    2
}

fn default_acquire_timeout() -> u64 {
    5
}

fn default_query_timeout() -> u64 {
    30
}

fn default_max_lifetime() -> u64 {
    1800
}

/// Query cache configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Disable to turn every lookup into a miss and every store into a
    /// no-op (default: enabled).
    #[serde(default = "default_cache_enabled")]
    pub enabled: bool,
    /// Maximum number of cached entries; 0 disables the cache
    /// (default: 100).
    #[serde(default = "default_cache_max_size")]
    pub max_size: usize,
    /// Entry time-to-live in seconds; 0 disables expiration (default: 300).
    #[serde(default = "default_cache_ttl")]
    pub ttl_secs: u64,
}

impl CacheConfig {
    /// `None` when expiration is disabled.
    pub fn ttl(&self) -> Option<Duration> {
        (self.ttl_secs > 0).then(|| Duration::from_secs(self.ttl_secs))
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_cache_enabled(),
            max_size: default_cache_max_size(),
            ttl_secs: default_cache_ttl(),
        }
    }
}

fn default_cache_enabled() -> bool {
    true
}

fn default_cache_max_size() -> usize {
    100
}

fn default_cache_ttl() -> u64 {
    300
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct BreakerConfig {
    /// Consecutive failures that open the circuit (default: 5).
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    /// Seconds the circuit stays open before permitting a trial call
    /// (default: 60).
    #[serde(default = "default_reset_timeout")]
    pub reset_timeout_secs: u64,
    /// Trial successes required to close the circuit again (default: 2).
    #[serde(default = "default_success_threshold")]
    pub success_threshold: u32,
}

impl BreakerConfig {
    pub fn reset_timeout(&self) -> Duration {
        Duration::from_secs(self.reset_timeout_secs)
    }
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            reset_timeout_secs: default_reset_timeout(),
            success_threshold: default_success_threshold(),
        }
    }
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_reset_timeout() -> u64 {
    60
}

fn default_success_threshold() -> u32 {
    2
}

/// Result sizing defaults shared by the analytical tools.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Hard ceiling on rows any single query may return (default: 10000).
    #[serde(default = "default_max_result_size")]
    pub max_result_size: usize,
    /// Page size applied when a tool call omits `limit` (default: 100).
    #[serde(default = "default_limit")]
    pub default_limit: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_result_size: default_max_result_size(),
            default_limit: default_limit(),
        }
    }
}

fn default_max_result_size() -> usize {
    10_000
}

fn default_limit() -> usize {
    100
}

impl MuninnConfig {
    /// Configuration for a database at `path` with defaults everywhere else.
    pub fn for_database(path: impl Into<PathBuf>) -> Self {
        Self {
            database: DatabaseConfig::for_path(path),
            cache: CacheConfig::default(),
            breaker: BreakerConfig::default(),
            server: ServerConfig::default(),
        }
    }

    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            MuninnError::Configuration(format!("failed to read config file {path:?}: {e}"))
        })?;
        let config: MuninnConfig = toml::from_str(&content).map_err(|e| {
            MuninnError::Configuration(format!("failed to parse config file {path:?}: {e}"))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from environment variables.
    ///
    /// `DB_PATH` is required; everything else falls back to defaults:
    /// `DB_POOL_SIZE`, `DB_MAX_OVERFLOW`, `DB_QUERY_TIMEOUT`,
    /// `CACHE_ENABLED`, `CACHE_MAX_SIZE`, `CACHE_TTL_SECONDS`,
    /// `BREAKER_FAILURE_THRESHOLD`, `BREAKER_RESET_TIMEOUT`,
    /// `BREAKER_SUCCESS_THRESHOLD`, `MAX_RESULT_SIZE`, `DEFAULT_LIMIT`.
    pub fn from_env() -> Result<Self> {
        let path = std::env::var("DB_PATH").map_err(|_| {
            MuninnError::Configuration(
                "DB_PATH environment variable is required (path to the simulation database)"
                    .into(),
            )
        })?;

        let mut config = Self::for_database(path);
        if let Some(v) = env_parse("DB_POOL_SIZE")? {
            config.database.pool_size = v;
        }
        if let Some(v) = env_parse("DB_MAX_OVERFLOW")? {
            config.database.max_overflow = v;
        }
        if let Some(v) = env_parse("DB_QUERY_TIMEOUT")? {
            config.database.query_timeout_secs = v;
        }
        if let Some(v) = env_bool("CACHE_ENABLED")? {
            config.cache.enabled = v;
        }
        if let Some(v) = env_parse("CACHE_MAX_SIZE")? {
            config.cache.max_size = v;
        }
        if let Some(v) = env_parse("CACHE_TTL_SECONDS")? {
            config.cache.ttl_secs = v;
        }
        if let Some(v) = env_parse("BREAKER_FAILURE_THRESHOLD")? {
            config.breaker.failure_threshold = v;
        }
        if let Some(v) = env_parse("BREAKER_RESET_TIMEOUT")? {
            config.breaker.reset_timeout_secs = v;
        }
        if let Some(v) = env_parse("BREAKER_SUCCESS_THRESHOLD")? {
            config.breaker.success_threshold = v;
        }
        if let Some(v) = env_parse("MAX_RESULT_SIZE")? {
            config.server.max_result_size = v;
        }
        if let Some(v) = env_parse("DEFAULT_LIMIT")? {
            config.server.default_limit = v;
        }
        config.validate()?;
        Ok(config)
    }

    /// Reject out-of-range values before any component is constructed.
    pub fn validate(&self) -> Result<()> {
        if self.database.pool_size == 0 {
            return Err(MuninnError::Configuration(
                "database.pool_size must be at least 1".into(),
            ));
        }
        if self.database.query_timeout_secs == 0 {
            return Err(MuninnError::Configuration(
                "database.query_timeout_secs must be at least 1".into(),
            ));
        }
        if self.breaker.failure_threshold == 0 {
            return Err(MuninnError::Configuration(
                "breaker.failure_threshold must be at least 1".into(),
            ));
        }
        if self.breaker.success_threshold == 0 {
            return Err(MuninnError::Configuration(
                "breaker.success_threshold must be at least 1".into(),
            ));
        }
        if self.server.default_limit == 0 || self.server.default_limit > self.server.max_result_size
        {
            return Err(MuninnError::Configuration(format!(
                "server.default_limit must be between 1 and {}",
                self.server.max_result_size
            )));
        }
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Result<Option<T>> {
    match std::env::var(key) {
        Ok(raw) => raw.parse::<T>().map(Some).map_err(|_| {
            MuninnError::Configuration(format!("invalid value for {key}: {raw:?}"))
        }),
        Err(_) => Ok(None),
    }
}

fn env_bool(key: &str) -> Result<Option<bool>> {
    match std::env::var(key) {
        Ok(raw) => match raw.to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(Some(true)),
            "false" | "0" | "no" | "off" => Ok(Some(false)),
            _ => Err(MuninnError::Configuration(format!(
                "invalid boolean for {key}: {raw:?}"
            ))),
        },
        Err(_) => Ok(None),
    }
}
