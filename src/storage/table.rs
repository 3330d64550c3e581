use crate::core::{ExecutionError, Result, Row, SemanticType, Value};
use crate::connection::ColumnMetadata;
use serde::{Deserialize, Serialize};

/// Column definition as the store keeps it: a native type name plus
/// key flags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredColumn {
    pub name: String,
    pub storage_type: String,
    pub primary_key: bool,
    pub unique: bool,
}

impl StoredColumn {
    pub fn new(name: impl Into<String>, storage_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            storage_type: storage_type.into(),
            primary_key: false,
            unique: false,
        }
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Rejects values the column type cannot hold. Unmapped storage types
    /// accept anything.
    fn validate(&self, value: &Value) -> Result<()> {
        if value.is_null() && self.primary_key {
            return Err(ExecutionError::ConstraintViolation(format!(
                "null value in column '{}' violates not-null constraint",
                self.name
            ))
            .into());
        }

        match SemanticType::from_storage_type(&self.storage_type) {
            Some(semantic) if !semantic.is_compatible(value) => Err(ExecutionError::Rejected(
                format!(
                    "column '{}' is of type {} but value is {}",
                    self.name,
                    self.storage_type,
                    value.type_name()
                ),
            )
            .into()),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    name: String,
    columns: Vec<StoredColumn>,
}

impl TableSchema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
        }
    }

    pub fn column(mut self, column: StoredColumn) -> Self {
        self.columns.push(column);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[StoredColumn] {
        &self.columns
    }

    pub fn find_column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Column positions of every uniqueness constraint: the primary key as
    /// one constraint, then each unique column on its own.
    pub fn constraints(&self) -> Vec<Vec<usize>> {
        let mut constraints = Vec::new();

        let primary: Vec<usize> = self
            .columns
            .iter()
            .enumerate()
            .filter(|(_, c)| c.primary_key)
            .map(|(idx, _)| idx)
            .collect();
        if !primary.is_empty() {
            constraints.push(primary);
        }

        for (idx, column) in self.columns.iter().enumerate() {
            if column.unique && !column.primary_key {
                constraints.push(vec![idx]);
            }
        }

        constraints
    }

    pub fn metadata(&self) -> Vec<ColumnMetadata> {
        self.columns
            .iter()
            .enumerate()
            .map(|(ordinal, c)| ColumnMetadata {
                name: c.name.clone(),
                storage_type: c.storage_type.clone(),
                ordinal,
                primary_key: c.primary_key,
                unique: c.unique,
            })
            .collect()
    }
}

/// Rows of one table in insertion order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Table {
    schema: TableSchema,
    rows: Vec<Row>,
}

impl Table {
    pub fn new(schema: TableSchema) -> Self {
        Self {
            schema,
            rows: Vec::new(),
        }
    }

    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn insert(&mut self, row: Row) -> Result<usize> {
        self.validate_row(&row)?;
        self.check_uniqueness(&row, None)?;
        self.rows.push(row);
        Ok(self.rows.len() - 1)
    }

    pub fn update(&mut self, id: usize, row: Row) -> Result<()> {
        self.validate_row(&row)?;
        self.check_uniqueness(&row, Some(id))?;
        match self.rows.get_mut(id) {
            Some(slot) => {
                *slot = row;
                Ok(())
            }
            None => Err(ExecutionError::Rejected(format!("row {} does not exist", id)).into()),
        }
    }

    /// Position of the live row whose `columns` equal those of `row`.
    /// Rows with a NULL in any of the columns never match.
    pub fn find_conflict(&self, columns: &[usize], row: &Row) -> Option<usize> {
        if columns.iter().any(|&idx| row[idx].is_null()) {
            return None;
        }
        self.rows
            .iter()
            .position(|existing| columns.iter().all(|&idx| existing[idx] == row[idx]))
    }

    fn check_uniqueness(&self, row: &Row, ignore_id: Option<usize>) -> Result<()> {
        for constraint in self.schema.constraints() {
            if constraint.iter().any(|&idx| row[idx].is_null()) {
                continue;
            }

            let clash = self.rows.iter().enumerate().any(|(id, existing)| {
                Some(id) != ignore_id && constraint.iter().all(|&idx| existing[idx] == row[idx])
            });

            if clash {
                let names: Vec<&str> = constraint
                    .iter()
                    .map(|&idx| self.schema.columns[idx].name.as_str())
                    .collect();
                return Err(ExecutionError::ConstraintViolation(format!(
                    "duplicate key value violates unique constraint on {}.({})",
                    self.schema.name,
                    names.join(", ")
                ))
                .into());
            }
        }
        Ok(())
    }

    fn validate_row(&self, row: &Row) -> Result<()> {
        let columns = self.schema.columns();
        if row.len() != columns.len() {
            return Err(ExecutionError::Rejected(format!(
                "Expected {} columns, got {}",
                columns.len(),
                row.len()
            ))
            .into());
        }
        for (column, value) in columns.iter().zip(row.iter()) {
            column.validate(value)?;
        }
        Ok(())
    }
}
