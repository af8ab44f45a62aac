//! Database session management.
//!
//! [`SessionPool`] owns a bounded pool of read-only SQLite sessions and hands
//! one out for the duration of a single query closure. Release is guaranteed
//! on every exit path — normal return, error, panic inside the closure, or a
//! caller that abandoned its wait — because the lease returns itself on
//! `Drop` from the blocking task that owns it.
//!
//! rusqlite is synchronous, so query closures run on the tokio blocking
//! thread pool. The per-query timeout races the caller's wait against the
//! query; when it fires, the caller gets [`MuninnError::QueryTimeout`] while
//! the blocking task runs to completion in the background and returns its
//! session then (best-effort cancellation — the in-flight statement is not
//! killed).

pub mod validate;

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use rusqlite::{Connection, OpenFlags};
use serde::Serialize;
use tokio::sync::Semaphore;
use tracing::{debug, error, warn};

use crate::config::DatabaseConfig;
use crate::telemetry;
use crate::{MuninnError, Result};

struct IdleSession {
    conn: Connection,
    opened_at: Instant,
}

struct PoolInner {
    config: DatabaseConfig,
    /// Bounds concurrent leases to `pool_size + max_overflow`.
    semaphore: Arc<Semaphore>,
    idle: Mutex<VecDeque<IdleSession>>,
    active: AtomicUsize,
}

/// Bounded pool of read-only database sessions.
///
/// Cheap to clone; clones share the same pool.
#[derive(Clone)]
pub struct SessionPool {
    inner: Arc<PoolInner>,
}

/// Pool utilization counts for health polling.
#[derive(Debug, Clone, Serialize)]
pub struct PoolStats {
    /// Sessions currently leased to queries.
    pub active: usize,
    /// Sessions parked in the idle queue.
    pub idle: usize,
    pub pool_size: usize,
    pub max_overflow: usize,
}

/// A leased session. Returns its connection to the pool on drop.
struct Lease {
    conn: Option<Connection>,
    opened_at: Instant,
    pool: SessionPool,
}

impl Lease {
    fn conn(&self) -> &Connection {
        self.conn.as_ref().expect("lease holds a connection until drop")
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.release(conn, self.opened_at);
        }
    }
}

impl SessionPool {
    /// Open a pool against the database at `config.path`.
    ///
    /// One session is opened eagerly so a bad path or unreadable file fails
    /// here rather than on the first query.
    pub fn connect(config: &DatabaseConfig) -> Result<Self> {
        let pool = Self {
            inner: Arc::new(PoolInner {
                config: config.clone(),
                semaphore: Arc::new(Semaphore::new(config.pool_size + config.max_overflow)),
                idle: Mutex::new(VecDeque::with_capacity(config.pool_size)),
                active: AtomicUsize::new(0),
            }),
        };

        let conn = pool.open_session()?;
        pool.inner.idle.lock().push_back(IdleSession {
            conn,
            opened_at: Instant::now(),
        });
        debug!(path = %config.path.display(), pool_size = config.pool_size, "session pool ready");
        Ok(pool)
    }

    /// Run `query` against a pooled session with the configured timeout.
    ///
    /// Driver errors surface as [`MuninnError::Database`]; a query that
    /// outlives the timeout surfaces as [`MuninnError::QueryTimeout`]; a
    /// panicking closure surfaces as [`MuninnError::Internal`].
    pub async fn execute<F, T>(&self, query: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let timeout = self.inner.config.query_timeout();
        let handle = self.spawn_query(query).await?;
        match tokio::time::timeout(timeout, handle).await {
            Ok(outcome) => flatten_join(outcome),
            Err(_) => {
                warn!(
                    timeout_secs = timeout.as_secs(),
                    "query abandoned after timeout; session returns when the statement finishes"
                );
                Err(MuninnError::QueryTimeout { timeout })
            }
        }
    }

    /// Run `query` against a pooled session with no timeout.
    ///
    /// The session is acquired under the bounded wait, handed to the closure
    /// on a blocking thread, and returned to the pool when the closure exits
    /// by any path.
    pub async fn with_session<F, T>(&self, query: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let handle = self.spawn_query(query).await?;
        flatten_join(handle.await)
    }

    /// Acquire a lease (bounded wait) and start the query on a blocking
    /// thread. The returned handle can be awaited or raced against a timer;
    /// either way the task owns its lease and releases it when done.
    async fn spawn_query<F, T>(&self, query: F) -> Result<tokio::task::JoinHandle<Result<T>>>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let acquire_timeout = self.inner.config.acquire_timeout();
        let permit = match tokio::time::timeout(
            acquire_timeout,
            self.inner.semaphore.clone().acquire_owned(),
        )
        .await
        {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => {
                return Err(MuninnError::Internal("session pool closed".into()));
            }
            Err(_) => {
                metrics::counter!(telemetry::POOL_EXHAUSTED_TOTAL).increment(1);
                warn!(
                    waited_ms = acquire_timeout.as_millis() as u64,
                    "session acquisition timed out"
                );
                return Err(MuninnError::PoolExhausted {
                    waited: acquire_timeout,
                });
            }
        };

        let pool = self.clone();
        Ok(tokio::task::spawn_blocking(move || {
            // The permit lives exactly as long as the lease.
            let _permit = permit;
            let lease = pool.checkout()?;
            query(lease.conn())
            // lease drops here (or during unwind), returning the session
        }))
    }

    /// Pool utilization for the observability surface.
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            active: self.inner.active.load(Ordering::Relaxed),
            idle: self.inner.idle.lock().len(),
            pool_size: self.inner.config.pool_size,
            max_overflow: self.inner.config.max_overflow,
        }
    }

    /// Take an idle session (validating it first) or open a fresh one.
    ///
    /// Runs on a blocking thread: probing and opening are filesystem I/O.
    fn checkout(&self) -> Result<Lease> {
        loop {
            let candidate = self.inner.idle.lock().pop_front();
            let Some(idle) = candidate else { break };

            if let Some(max_lifetime) = self.inner.config.max_lifetime() {
                if idle.opened_at.elapsed() > max_lifetime {
                    metrics::counter!(telemetry::SESSIONS_RECYCLED_TOTAL).increment(1);
                    debug!("recycling session past max lifetime");
                    drop(idle.conn);
                    continue;
                }
            }

            // Liveness probe before reuse; a dead session is discarded and
            // replaced transparently.
            if idle.conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0)).is_err() {
                warn!("idle session failed liveness probe, discarding");
                drop(idle.conn);
                continue;
            }

            self.inner.active.fetch_add(1, Ordering::Relaxed);
            return Ok(Lease {
                conn: Some(idle.conn),
                opened_at: idle.opened_at,
                pool: self.clone(),
            });
        }

        let conn = self.open_session()?;
        self.inner.active.fetch_add(1, Ordering::Relaxed);
        Ok(Lease {
            conn: Some(conn),
            opened_at: Instant::now(),
            pool: self.clone(),
        })
    }

    /// Park a released session, or discard it above the base pool size
    /// (overflow sessions are transient by contract).
    fn release(&self, conn: Connection, opened_at: Instant) {
        self.inner.active.fetch_sub(1, Ordering::Relaxed);
        let mut idle = self.inner.idle.lock();
        if idle.len() < self.inner.config.pool_size {
            idle.push_back(IdleSession { conn, opened_at });
        }
        // else: dropped here — overflow session discarded
    }

    fn open_session(&self) -> Result<Connection> {
        let conn = Connection::open_with_flags(
            &self.inner.config.path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| {
            MuninnError::Database(format!(
                "failed to open database {}: {e}",
                self.inner.config.path.display()
            ))
        })?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        Ok(conn)
    }
}

fn flatten_join<T>(outcome: std::result::Result<Result<T>, tokio::task::JoinError>) -> Result<T> {
    match outcome {
        Ok(result) => result,
        Err(join_err) => {
            error!(error = %join_err, "query task failed");
            Err(MuninnError::Internal(format!("query task failed: {join_err}")))
        }
    }
}
