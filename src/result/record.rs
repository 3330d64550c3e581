use std::sync::Arc;

use crate::core::{ExecutionError, FromValue, Row, Value};

/// One decoded tuple with its column names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    columns: Arc<[String]>,
    values: Row,
}

impl Record {
    pub fn new(columns: Arc<[String]>, values: Row) -> Self {
        Self { columns, values }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn into_values(self) -> Row {
        self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn value_at(&self, idx: usize) -> Option<&Value> {
        self.values.get(idx)
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c == column)
            .and_then(|idx| self.values.get(idx))
    }

    /// Typed lookup by column name.
    pub fn get_as<T: FromValue>(&self, column: &str) -> Result<T, ExecutionError> {
        let value = self.get(column).ok_or_else(|| {
            ExecutionError::Decode(format!("column '{}' missing from result", column))
        })?;
        T::from_value(value)
    }
}

/// Builds a typed row from a decoded record. Implemented by
/// `#[derive(Entity)]`.
pub trait FromRecord: Sized {
    fn from_record(record: &Record) -> Result<Self, ExecutionError>;
}

impl FromRecord for Record {
    fn from_record(record: &Record) -> Result<Self, ExecutionError> {
        Ok(record.clone())
    }
}
