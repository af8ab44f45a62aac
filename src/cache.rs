//! Query result cache with TTL expiration and strict LRU eviction.
//!
//! [`QueryCache`] stores tool results keyed on a digest of the tool name and
//! its parameters. Entries expire lazily: an entry older than the configured
//! TTL is evicted on the read that finds it, never returned. When the store
//! is full, the least-recently-used entry makes room for the next insert.
//!
//! The store never fails — a disabled cache (`enabled = false` or
//! `max_size = 0`) reports every lookup as a miss and ignores stores, so
//! callers need no special-casing.
//!
//! # Key derivation
//!
//! [`key_for`] hashes `(tool_name, params)` with SHA-256 over a
//! sorted-key serialization, so the same parameters produce the same key
//! regardless of insertion order. Parameters originate from an untrusted
//! caller; a cryptographic digest keeps deliberately crafted collisions off
//! the table.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use lru::LruCache;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::config::CacheConfig;
use crate::exec::ToolParams;
use crate::telemetry;

struct CacheEntry {
    value: Value,
    inserted_at: Instant,
}

struct CacheInner {
    /// `None` when the cache is disabled.
    store: Option<Mutex<LruCache<String, CacheEntry>>>,
    ttl: Option<Duration>,
    max_size: usize,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

/// Thread-safe LRU + TTL store for tool results.
///
/// Cheap to clone; clones share the same underlying store.
#[derive(Clone)]
pub struct QueryCache {
    inner: Arc<CacheInner>,
}

/// Point-in-time cache statistics for health polling.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub enabled: bool,
    pub size: usize,
    pub max_size: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub hit_rate: f64,
    pub ttl_secs: u64,
}

impl QueryCache {
    /// Create a cache from configuration.
    pub fn new(config: &CacheConfig) -> Self {
        let store = if config.enabled {
            NonZeroUsize::new(config.max_size).map(|cap| Mutex::new(LruCache::new(cap)))
        } else {
            None
        };

        Self {
            inner: Arc::new(CacheInner {
                store,
                ttl: config.ttl(),
                max_size: config.max_size,
                hits: AtomicU64::new(0),
                misses: AtomicU64::new(0),
                evictions: AtomicU64::new(0),
            }),
        }
    }

    /// Look up a cached value, refreshing its recency on a hit.
    ///
    /// An entry past its TTL is evicted here and reported as a miss.
    pub fn get(&self, key: &str) -> Option<Value> {
        let Some(store) = &self.inner.store else {
            return self.record_miss(key);
        };

        // Lookup outcome: None = absent, Some(None) = present but expired,
        // Some(Some(v)) = hit. Counter updates happen outside the lock.
        let looked_up = {
            let mut guard = store.lock();
            let outcome = match guard.get(key) {
                None => None,
                Some(entry) => {
                    let fresh = self
                        .inner
                        .ttl
                        .map_or(true, |ttl| entry.inserted_at.elapsed() <= ttl);
                    Some(fresh.then(|| entry.value.clone()))
                }
            };
            if let Some(None) = outcome {
                guard.pop(key);
            }
            outcome
        };

        match looked_up {
            Some(Some(value)) => {
                self.inner.hits.fetch_add(1, Ordering::Relaxed);
                metrics::counter!(telemetry::CACHE_HITS_TOTAL).increment(1);
                debug!(key, "cache hit");
                Some(value)
            }
            Some(None) => {
                self.inner.evictions.fetch_add(1, Ordering::Relaxed);
                self.inner.misses.fetch_add(1, Ordering::Relaxed);
                metrics::counter!(telemetry::CACHE_EVICTIONS_TOTAL).increment(1);
                metrics::counter!(telemetry::CACHE_MISSES_TOTAL).increment(1);
                debug!(key, "cache miss (expired)");
                None
            }
            None => self.record_miss(key),
        }
    }

    /// Store a value as the most-recently-used entry, evicting the
    /// least-recently-used one if the store is at capacity. No-op when the
    /// cache is disabled.
    pub fn set(&self, key: &str, value: Value) {
        let Some(store) = &self.inner.store else {
            return;
        };

        let entry = CacheEntry {
            value,
            inserted_at: Instant::now(),
        };
        let evicted = store.lock().push(key.to_owned(), entry);
        if let Some((evicted_key, _)) = evicted {
            // push() also returns the previous entry on overwrite; only a
            // different key means an LRU eviction happened.
            if evicted_key != key {
                self.inner.evictions.fetch_add(1, Ordering::Relaxed);
                metrics::counter!(telemetry::CACHE_EVICTIONS_TOTAL).increment(1);
                debug!(key = %evicted_key, "cache eviction (lru)");
            }
        }
    }

    /// Drop every entry and reset the counters.
    pub fn clear(&self) {
        if let Some(store) = &self.inner.store {
            store.lock().clear();
        }
        self.inner.hits.store(0, Ordering::Relaxed);
        self.inner.misses.store(0, Ordering::Relaxed);
        self.inner.evictions.store(0, Ordering::Relaxed);
    }

    /// Snapshot the counters for observability polling.
    pub fn stats(&self) -> CacheStats {
        let hits = self.inner.hits.load(Ordering::Relaxed);
        let misses = self.inner.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        CacheStats {
            enabled: self.inner.store.is_some(),
            size: self
                .inner
                .store
                .as_ref()
                .map_or(0, |store| store.lock().len()),
            max_size: self.inner.max_size,
            hits,
            misses,
            evictions: self.inner.evictions.load(Ordering::Relaxed),
            hit_rate: if total > 0 {
                hits as f64 / total as f64
            } else {
                0.0
            },
            ttl_secs: self.inner.ttl.map_or(0, |ttl| ttl.as_secs()),
        }
    }

    fn record_miss(&self, key: &str) -> Option<Value> {
        self.inner.misses.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(telemetry::CACHE_MISSES_TOTAL).increment(1);
        debug!(key, "cache miss");
        None
    }
}

/// Derive the cache key for a tool call.
///
/// Parameters are serialized with sorted keys (both `ToolParams` and nested
/// objects are backed by ordered maps), so insertion order never changes the
/// key. The digest is SHA-256, rendered as `"{tool}:{hex}"`.
pub fn key_for(tool_name: &str, params: &ToolParams) -> String {
    let serialized =
        serde_json::to_string(params).expect("BTreeMap of JSON values always serializes");
    let mut hasher = Sha256::new();
    hasher.update(serialized.as_bytes());
    format!("{tool_name}:{}", hex::encode(hasher.finalize()))
}
