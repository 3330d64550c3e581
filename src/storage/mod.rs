//! In-memory reference store.
//!
//! `MemoryStore` implements the connection boundary entirely in process: it
//! interprets the SQL the binder and the upsert engine render, answers
//! metadata queries, and runs transactions by holding the catalog write lock
//! with a snapshot to restore on rollback. Fault injection (`set_available`,
//! `set_latency`) lets callers exercise outage and cancellation paths.

pub mod catalog;
pub mod sql;
pub mod table;

pub use catalog::Catalog;
pub use table::{StoredColumn, Table, TableSchema};

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{OwnedRwLockWriteGuard, RwLock};
use tracing::trace;

use crate::connection::config::ConnectionConfig;
use crate::connection::{ColumnMetadata, Connection, Connector};
use crate::core::{ExecutionError, Result, Row, Value};
use crate::result::QueryResult;
use sql::Command;

struct StoreInner {
    catalog: Arc<RwLock<Catalog>>,
    available: AtomicBool,
    latency_nanos: AtomicU64,
    statements: AtomicU64,
    connections: AtomicU64,
}

/// Shared handle to one in-memory database. Clones see the same data.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<StoreInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(StoreInner {
                catalog: Arc::new(RwLock::new(Catalog::new())),
                available: AtomicBool::new(true),
                latency_nanos: AtomicU64::new(0),
                statements: AtomicU64::new(0),
                connections: AtomicU64::new(0),
            }),
        }
    }

    /// Plays the role of an applied migration.
    pub async fn create_table(&self, schema: TableSchema) -> Result<()> {
        self.inner.catalog.write().await.create_table(schema)
    }

    /// Seeds one row without going through SQL. Uniqueness and column types
    /// are still enforced.
    pub async fn insert(&self, table: &str, row: Row) -> Result<()> {
        let mut catalog = self.inner.catalog.write().await;
        catalog.get_table_mut(table)?.insert(row)?;
        Ok(())
    }

    /// Current rows of `table` in insertion order.
    pub async fn rows(&self, table: &str) -> Result<Vec<Row>> {
        let catalog = self.inner.catalog.read().await;
        Ok(catalog.get_table(table)?.rows().to_vec())
    }

    /// While unavailable every round trip fails with
    /// `ExecutionError::Unavailable` and existing connections report invalid.
    pub fn set_available(&self, available: bool) {
        self.inner.available.store(available, Ordering::SeqCst);
    }

    pub fn is_available(&self) -> bool {
        self.inner.available.load(Ordering::SeqCst)
    }

    /// Delay added to every round trip. Saturates at `u64::MAX` nanoseconds.
    pub fn set_latency(&self, latency: Duration) {
        let nanos = u64::try_from(latency.as_nanos()).unwrap_or(u64::MAX);
        self.inner.latency_nanos.store(nanos, Ordering::SeqCst);
    }

    pub fn latency(&self) -> Duration {
        Duration::from_nanos(self.inner.latency_nanos.load(Ordering::SeqCst))
    }

    /// Number of `execute`/`query` calls that reached the store.
    pub fn statement_count(&self) -> u64 {
        self.inner.statements.load(Ordering::SeqCst)
    }

    pub fn connection_count(&self) -> u64 {
        self.inner.connections.load(Ordering::SeqCst)
    }

    pub fn connect(&self) -> Result<MemoryConnection> {
        if !self.is_available() {
            return Err(ExecutionError::Unavailable("memory store is not accepting connections".into()).into());
        }
        self.inner.connections.fetch_add(1, Ordering::SeqCst);
        Ok(MemoryConnection {
            store: Arc::clone(&self.inner),
            transaction: None,
        })
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Connector for MemoryStore {
    async fn connect(&self, _config: &ConnectionConfig) -> Result<Box<dyn Connection>> {
        Ok(Box::new(MemoryStore::connect(self)?))
    }
}

struct Transaction {
    guard: OwnedRwLockWriteGuard<Catalog>,
    backup: Catalog,
}

/// One session with a `MemoryStore`.
pub struct MemoryConnection {
    store: Arc<StoreInner>,
    transaction: Option<Transaction>,
}

impl MemoryConnection {
    /// Simulated network hop: fails when the store is down, then waits out
    /// the configured latency.
    async fn round_trip(&self) -> Result<()> {
        if !self.store.available.load(Ordering::SeqCst) {
            return Err(ExecutionError::Unavailable("memory store is unavailable".into()).into());
        }

        let latency = Duration::from_nanos(self.store.latency_nanos.load(Ordering::SeqCst));
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        Ok(())
    }

    async fn run(&mut self, sql: &str, params: &[Value]) -> Result<Outcome> {
        self.store.statements.fetch_add(1, Ordering::SeqCst);
        self.round_trip().await?;

        trace!(sql, params = params.len(), "memory store statement");
        let command = Command::parse(sql)?;

        match (&command, self.transaction.as_mut()) {
            (Command::Select(plan), Some(tx)) => plan.run(&tx.guard, params).map(Outcome::Rows),
            (Command::Select(plan), None) => {
                let catalog = self.store.catalog.read().await;
                plan.run(&catalog, params).map(Outcome::Rows)
            }
            (Command::Insert(plan), Some(tx)) => plan.apply(&mut tx.guard, params).map(Outcome::Affected),
            (Command::Insert(plan), None) => {
                let mut catalog = self.store.catalog.write().await;
                plan.apply(&mut catalog, params).map(Outcome::Affected)
            }
        }
    }

    async fn with_catalog<T>(&self, read: impl FnOnce(&Catalog) -> T) -> T {
        match self.transaction.as_ref() {
            Some(tx) => read(&tx.guard),
            None => read(&*self.store.catalog.read().await),
        }
    }
}

enum Outcome {
    Rows(QueryResult),
    Affected(u64),
}

#[async_trait]
impl Connection for MemoryConnection {
    async fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64> {
        match self.run(sql, params).await? {
            Outcome::Affected(count) => Ok(count),
            Outcome::Rows(result) => Ok(result.row_count() as u64),
        }
    }

    async fn query(&mut self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        match self.run(sql, params).await? {
            Outcome::Rows(result) => Ok(result),
            Outcome::Affected(_) => {
                Err(ExecutionError::Rejected("statement does not return rows".into()).into())
            }
        }
    }

    async fn table_exists(&mut self, table: &str) -> Result<bool> {
        self.round_trip().await?;
        Ok(self.with_catalog(|catalog| catalog.table_exists(table)).await)
    }

    async fn describe_table(&mut self, table: &str) -> Result<Vec<ColumnMetadata>> {
        self.round_trip().await?;
        self.with_catalog(|catalog| catalog.get_table(table).map(|t| t.schema().metadata()))
            .await
    }

    async fn begin(&mut self) -> Result<()> {
        if self.transaction.is_some() {
            return Err(ExecutionError::Rejected(
                "there is already a transaction in progress".into(),
            )
            .into());
        }
        self.round_trip().await?;

        let guard = Arc::clone(&self.store.catalog).write_owned().await;
        let backup = guard.clone();
        self.transaction = Some(Transaction { guard, backup });
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        if self.transaction.is_none() {
            return Err(ExecutionError::Rejected("there is no transaction in progress".into()).into());
        }
        self.round_trip().await?;
        self.transaction = None;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        if self.transaction.is_none() {
            return Err(ExecutionError::Rejected("there is no transaction in progress".into()).into());
        }
        self.round_trip().await?;
        if let Some(Transaction { mut guard, backup }) = self.transaction.take() {
            *guard = backup;
        }
        Ok(())
    }

    fn is_in_transaction(&self) -> bool {
        self.transaction.is_some()
    }

    fn is_valid(&self) -> bool {
        self.store.available.load(Ordering::SeqCst)
    }
}

impl Drop for MemoryConnection {
    /// A session that goes away mid-transaction is aborted.
    fn drop(&mut self) {
        if let Some(Transaction { mut guard, backup }) = self.transaction.take() {
            *guard = backup;
        }
    }
}
