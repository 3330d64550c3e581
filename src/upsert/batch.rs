use std::sync::Arc;

use crate::core::{ExecutionError, Row, TableDescriptor, Value};
use crate::schema::Entity;

/// Rows destined for one table, in the table's column order.
///
/// Every row is checked against the descriptor when pushed, so a batch that
/// reaches the engine is well-formed. A batch is consumed by one upsert.
#[derive(Debug, Clone)]
pub struct Batch {
    table: Arc<TableDescriptor>,
    rows: Vec<Row>,
}

impl Batch {
    pub fn new(table: Arc<TableDescriptor>) -> Self {
        Self {
            table,
            rows: Vec::new(),
        }
    }

    pub fn with_capacity(table: Arc<TableDescriptor>, capacity: usize) -> Self {
        Self {
            table,
            rows: Vec::with_capacity(capacity),
        }
    }

    /// Builds a batch from entities, mapping their fields onto the table's
    /// columns by name.
    pub fn from_entities<'a, E, I>(table: Arc<TableDescriptor>, entities: I) -> Result<Self, ExecutionError>
    where
        E: Entity,
        I: IntoIterator<Item = &'a E>,
    {
        let mut batch = Self::new(table);
        for entity in entities {
            batch.push_entity(entity)?;
        }
        Ok(batch)
    }

    pub fn table(&self) -> &Arc<TableDescriptor> {
        &self.table
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn push(&mut self, row: Row) -> Result<(), ExecutionError> {
        if row.len() != self.table.column_count() {
            return Err(ExecutionError::ArgumentMismatch(format!(
                "row {} of batch for '{}' has {} value(s), table has {} column(s)",
                self.rows.len(),
                self.table.name(),
                row.len(),
                self.table.column_count()
            )));
        }

        for (column, value) in self.table.columns().iter().zip(&row) {
            if !column.semantic_type.is_compatible(value) {
                return Err(ExecutionError::ArgumentMismatch(format!(
                    "row {} of batch for '{}': {} value for {} column '{}'",
                    self.rows.len(),
                    self.table.name(),
                    value.type_name(),
                    column.semantic_type,
                    column.name
                )));
            }
        }

        self.rows.push(row);
        Ok(())
    }

    /// Columns the entity does not declare are sent as NULL.
    pub fn push_entity<E: Entity>(&mut self, entity: &E) -> Result<(), ExecutionError> {
        let definition = E::definition();
        let mut values = entity.to_row();
        if values.len() != definition.fields.len() {
            return Err(ExecutionError::ArgumentMismatch(format!(
                "entity for '{}' produced {} value(s) for {} field(s)",
                definition.table,
                values.len(),
                definition.fields.len()
            )));
        }

        let row = self
            .table
            .columns()
            .iter()
            .map(|column| {
                definition
                    .fields
                    .iter()
                    .position(|field| field.name == column.name)
                    .map(|idx| std::mem::replace(&mut values[idx], Value::Null))
                    .unwrap_or(Value::Null)
            })
            .collect();

        self.push(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ColumnDescriptor, SemanticType};
    use crate::result::{FromRecord, Record};
    use crate::schema::EntityDefinition;

    fn people() -> Arc<TableDescriptor> {
        Arc::new(
            TableDescriptor::new(
                "people",
                vec![
                    ColumnDescriptor::new("id", SemanticType::Integer).primary_key(),
                    ColumnDescriptor::new("email", SemanticType::Text).unique(),
                    ColumnDescriptor::new("version", SemanticType::Integer),
                ],
            )
            .unwrap(),
        )
    }

    struct Person {
        email: String,
        id: i64,
    }

    impl FromRecord for Person {
        fn from_record(record: &Record) -> Result<Self, ExecutionError> {
            Ok(Self {
                email: record.get_as("email")?,
                id: record.get_as("id")?,
            })
        }
    }

    impl Entity for Person {
        fn table_name() -> &'static str {
            "people"
        }

        fn definition() -> EntityDefinition {
            EntityDefinition::new("people")
                .field(ColumnDescriptor::new("email", SemanticType::Text).unique())
                .field(ColumnDescriptor::new("id", SemanticType::Integer).primary_key())
        }

        fn to_row(&self) -> Row {
            vec![self.email.clone().into(), self.id.into()]
        }
    }

    #[test]
    fn test_push_checks_shape() {
        let mut batch = Batch::new(people());
        batch
            .push(vec![Value::Integer(1), "a@x".into(), Value::Integer(1)])
            .unwrap();

        assert!(matches!(
            batch.push(vec![Value::Integer(2)]),
            Err(ExecutionError::ArgumentMismatch(_))
        ));
        assert!(matches!(
            batch.push(vec!["two".into(), "b@x".into(), Value::Integer(1)]),
            Err(ExecutionError::ArgumentMismatch(_))
        ));
        assert_eq!(batch.len(), 1);
    }

    #[test]
    fn test_entities_are_mapped_by_column_name() {
        let people_list = [Person {
            email: "a@x".into(),
            id: 7,
        }];
        let batch = Batch::from_entities(people(), &people_list).unwrap();

        assert_eq!(
            batch.rows(),
            &[vec![Value::Integer(7), "a@x".into(), Value::Null]]
        );
    }
}
