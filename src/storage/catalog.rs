use std::collections::HashMap;

use super::{Table, TableSchema};
use crate::core::{ExecutionError, Result, SchemaError};

/// Every table of a `MemoryStore`. Cloned wholesale to snapshot state at
/// the start of a transaction.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    tables: HashMap<String, Table>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_table(&mut self, schema: TableSchema) -> Result<()> {
        let name = schema.name().to_string();

        if self.tables.contains_key(&name) {
            return Err(ExecutionError::Rejected(format!("relation '{}' already exists", name)).into());
        }
        if schema.columns().is_empty() {
            return Err(
                ExecutionError::Rejected(format!("table '{}' must have columns", name)).into(),
            );
        }

        self.tables.insert(name, Table::new(schema));
        Ok(())
    }

    pub fn get_table(&self, name: &str) -> Result<&Table> {
        self.tables
            .get(name)
            .ok_or_else(|| SchemaError::NotFound(name.to_string()).into())
    }

    pub fn get_table_mut(&mut self, name: &str) -> Result<&mut Table> {
        self.tables
            .get_mut(name)
            .ok_or_else(|| SchemaError::NotFound(name.to_string()).into())
    }

    pub fn table_exists(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    pub fn list_tables(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tables.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }
}
