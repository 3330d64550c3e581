pub mod config;
pub mod pool;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::{Result, Value};
use crate::result::QueryResult;
use config::ConnectionConfig;

/// Column as reported by a store's metadata catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMetadata {
    pub name: String,
    /// Store-native type name, e.g. `VARCHAR(191)` or `bigint`.
    pub storage_type: String,
    /// Zero-based position in the table definition.
    pub ordinal: usize,
    pub primary_key: bool,
    pub unique: bool,
}

/// Live session with a store.
///
/// This is the only collaborator the binding layer needs. Implementations
/// report transport failures as `ExecutionError::Unavailable`, uniqueness
/// violations as `ExecutionError::ConstraintViolation` and missing tables as
/// `SchemaError::NotFound`.
#[async_trait]
pub trait Connection: Send {
    /// Run a statement with positional `$n` parameters and return the
    /// number of affected rows.
    async fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64>;

    /// Run a query with positional `$n` parameters.
    async fn query(&mut self, sql: &str, params: &[Value]) -> Result<QueryResult>;

    async fn table_exists(&mut self, table: &str) -> Result<bool>;

    /// Columns of `table` in definition order.
    async fn describe_table(&mut self, table: &str) -> Result<Vec<ColumnMetadata>>;

    async fn begin(&mut self) -> Result<()>;

    async fn commit(&mut self) -> Result<()>;

    async fn rollback(&mut self) -> Result<()>;

    fn is_in_transaction(&self) -> bool;

    /// Cheap liveness check used when handing out pooled connections.
    fn is_valid(&self) -> bool {
        true
    }
}

/// Opens connections for a pool.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, config: &ConnectionConfig) -> Result<Box<dyn Connection>>;
}
