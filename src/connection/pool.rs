use super::{Connection, Connector, config::ConnectionConfig};
use crate::core::{Context, ExecutionError, Result};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info, warn};

/// Connection pool
///
/// Owns every store connection of a process. Opened once at startup, shared
/// by reference (or `Arc`) with the components that need a connection, and
/// closed explicitly at shutdown. Checkouts are bounded by a semaphore sized
/// to `max_connections`.
pub struct ConnectionPool {
    config: ConnectionConfig,
    connector: Arc<dyn Connector>,
    shared: Arc<PoolShared>,
    semaphore: Arc<Semaphore>,
}

struct PoolShared {
    available: Mutex<VecDeque<PooledConnection>>,
    total_connections: AtomicUsize,
    next_id: AtomicU64,
    closed: AtomicBool,
}

impl PoolShared {
    fn available(&self) -> MutexGuard<'_, VecDeque<PooledConnection>> {
        // Nothing panics while the lock is held, but a poisoned deque is
        // still structurally valid.
        self.available
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// A connection from the pool
struct PooledConnection {
    id: u64,
    connection: Box<dyn Connection>,
    created_at: Instant,
    last_used: Instant,
}

impl PooledConnection {
    fn new(id: u64, connection: Box<dyn Connection>) -> Self {
        let now = Instant::now();
        Self {
            id,
            connection,
            created_at: now,
            last_used: now,
        }
    }

    fn is_expired(&self, max_lifetime: Option<Duration>) -> bool {
        if let Some(lifetime) = max_lifetime {
            self.created_at.elapsed() > lifetime
        } else {
            false
        }
    }

    fn is_idle_too_long(&self, idle_timeout: Option<Duration>) -> bool {
        if let Some(timeout) = idle_timeout {
            self.last_used.elapsed() > timeout
        } else {
            false
        }
    }

    fn refresh_last_used(&mut self) {
        self.last_used = Instant::now();
    }
}

impl ConnectionPool {
    /// Open a pool and eagerly create `min_connections` connections.
    pub async fn open(config: ConnectionConfig, connector: Arc<dyn Connector>) -> Result<Self> {
        config.validate()?;

        let pool = Self {
            semaphore: Arc::new(Semaphore::new(config.max_connections)),
            shared: Arc::new(PoolShared {
                available: Mutex::new(VecDeque::new()),
                total_connections: AtomicUsize::new(0),
                next_id: AtomicU64::new(1),
                closed: AtomicBool::new(false),
            }),
            connector,
            config,
        };

        pool.ensure_min_connections().await?;

        info!(
            url = %pool.config.to_url(),
            min_connections = pool.config.min_connections,
            max_connections = pool.config.max_connections,
            "connection pool opened"
        );

        Ok(pool)
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Check out a connection.
    ///
    /// Waits at most `connect_timeout` for a free slot and gives up early when
    /// `ctx` is cancelled or its deadline passes.
    pub async fn acquire(&self, ctx: &Context) -> Result<PoolGuard> {
        if self.is_closed() {
            return Err(ExecutionError::Unavailable("connection pool is closed".into()).into());
        }

        let waited = ctx
            .run(tokio::time::timeout(
                self.config.connect_timeout,
                Arc::clone(&self.semaphore).acquire_owned(),
            ))
            .await?;

        let permit = match waited {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => {
                return Err(ExecutionError::Unavailable("connection pool is closed".into()).into());
            }
            Err(_) => {
                return Err(ExecutionError::Unavailable(
                    "timed out waiting for a pooled connection".into(),
                )
                .into());
            }
        };

        let pooled = match self.take_available() {
            Some(mut pooled) => {
                pooled.refresh_last_used();
                pooled
            }
            None => {
                let connection = ctx.run(self.connector.connect(&self.config)).await??;
                self.register(connection)
            }
        };

        debug!(connection_id = pooled.id, "connection checked out");

        Ok(PoolGuard {
            connection: Some(pooled),
            shared: Arc::clone(&self.shared),
            broken: false,
            _permit: permit,
        })
    }

    /// Pop the first reusable idle connection, closing stale ones on the way.
    fn take_available(&self) -> Option<PooledConnection> {
        let mut available = self.shared.available();

        while let Some(pooled) = available.pop_front() {
            if pooled.is_expired(self.config.max_lifetime)
                || pooled.is_idle_too_long(self.config.idle_timeout)
                || !pooled.connection.is_valid()
            {
                debug!(connection_id = pooled.id, "closing stale pooled connection");
                self.shared.total_connections.fetch_sub(1, Ordering::SeqCst);
                continue;
            }
            return Some(pooled);
        }

        None
    }

    fn register(&self, connection: Box<dyn Connection>) -> PooledConnection {
        let id = self.shared.next_id.fetch_add(1, Ordering::SeqCst);
        self.shared.total_connections.fetch_add(1, Ordering::SeqCst);
        PooledConnection::new(id, connection)
    }

    async fn ensure_min_connections(&self) -> Result<()> {
        while self.shared.total_connections.load(Ordering::SeqCst) < self.config.min_connections {
            let connection = self.connector.connect(&self.config).await?;
            let pooled = self.register(connection);
            self.shared.available().push_back(pooled);
        }

        Ok(())
    }

    pub fn stats(&self) -> PoolStats {
        let available = self.shared.available().len();
        let total = self.shared.total_connections.load(Ordering::SeqCst);

        PoolStats {
            total_connections: total,
            available_connections: available,
            active_connections: total.saturating_sub(available),
            max_connections: self.config.max_connections,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }

    /// Close the pool: pending and future checkouts fail with `Unavailable`,
    /// idle connections are dropped now and checked-out ones when returned.
    pub fn close(&self) {
        if self.shared.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.semaphore.close();

        let drained = {
            let mut available = self.shared.available();
            let drained = available.len();
            available.clear();
            drained
        };
        self.shared
            .total_connections
            .fetch_sub(drained, Ordering::SeqCst);

        info!(closed_idle = drained, "connection pool closed");
    }
}

/// Connection pool statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolStats {
    pub total_connections: usize,
    pub available_connections: usize,
    pub active_connections: usize,
    pub max_connections: usize,
}

impl std::fmt::Display for PoolStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Pool Stats: {}/{} active, {} available, max {}",
            self.active_connections,
            self.total_connections,
            self.available_connections,
            self.max_connections
        )
    }
}

/// RAII guard for pooled connections
///
/// Returns the connection to the pool when dropped, unless it was marked
/// broken or is still inside a transaction.
pub struct PoolGuard {
    connection: Option<PooledConnection>,
    shared: Arc<PoolShared>,
    broken: bool,
    _permit: OwnedSemaphorePermit,
}

impl PoolGuard {
    pub fn id(&self) -> u64 {
        self.connection.as_ref().map(|c| c.id).unwrap_or_default()
    }

    /// Get a reference to the connection
    pub fn connection(&mut self) -> &mut dyn Connection {
        self.connection
            .as_mut()
            .map(|pooled| pooled.connection.as_mut())
            .expect("Connection already returned to pool")
    }

    /// Mark the connection as unusable, e.g. after an interrupted round trip
    /// left its protocol state unknown. It is closed instead of returned.
    pub fn discard(&mut self) {
        self.broken = true;
    }

    /// Unwraps a round trip raced against a `Context`. When the context won,
    /// the store may still be mid-statement, so the connection is discarded.
    pub fn settle<T>(&mut self, outcome: std::result::Result<Result<T>, ExecutionError>) -> Result<T> {
        match outcome {
            Ok(result) => result,
            Err(interrupted) => {
                self.discard();
                Err(interrupted.into())
            }
        }
    }

    /// Return the connection explicitly, rolling back an open transaction
    /// first. Unlike `Drop`, this can await the rollback.
    pub async fn release(mut self) -> Result<()> {
        if !self.broken
            && let Some(pooled) = self.connection.as_mut()
            && pooled.connection.is_in_transaction()
        {
            if let Err(err) = pooled.connection.rollback().await {
                self.broken = true;
                return Err(err);
            }
        }
        Ok(())
    }
}

impl Drop for PoolGuard {
    fn drop(&mut self) {
        let Some(mut pooled) = self.connection.take() else {
            return;
        };

        let reason = if self.broken {
            Some("connection marked broken")
        } else if pooled.connection.is_in_transaction() {
            Some("connection dropped with an open transaction")
        } else if !pooled.connection.is_valid() {
            Some("connection no longer valid")
        } else if self.shared.closed.load(Ordering::SeqCst) {
            Some("pool closed")
        } else {
            None
        };

        if let Some(reason) = reason {
            warn!(connection_id = pooled.id, reason, "discarding pooled connection");
            self.shared.total_connections.fetch_sub(1, Ordering::SeqCst);
            return;
        }

        pooled.refresh_last_used();
        self.shared.available().push_back(pooled);
    }
}
