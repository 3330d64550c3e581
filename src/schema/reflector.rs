use std::sync::Arc;

use tracing::debug;

use super::{Entity, EntityDefinition};
use crate::connection::pool::ConnectionPool;
use crate::core::{
    ColumnDescriptor, Context, Result, SchemaError, SemanticType, TableDescriptor,
};

/// Where a table description comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReflectSource {
    /// Introspect an existing table through the store's metadata.
    Table(String),
    /// Trust a declared entity; no store access.
    Entity(EntityDefinition),
}

/// Produces `TableDescriptor`s. Never writes to the store.
#[derive(Clone)]
pub struct SchemaReflector {
    pool: Arc<ConnectionPool>,
}

impl SchemaReflector {
    pub fn new(pool: Arc<ConnectionPool>) -> Self {
        Self { pool }
    }

    pub async fn reflect(&self, ctx: &Context, source: ReflectSource) -> Result<Arc<TableDescriptor>> {
        let descriptor = match source {
            ReflectSource::Table(table) => self.reflect_table(ctx, &table).await?,
            ReflectSource::Entity(definition) => definition.to_descriptor()?,
        };
        Ok(Arc::new(descriptor))
    }

    /// Declared descriptor of `E`, after checking that every declared column
    /// exists in the live table with the same semantic type and key role.
    /// Conflict targets are validated against these keys, so they must not
    /// claim more or less than the store enforces.
    pub async fn reflect_entity<E: Entity>(&self, ctx: &Context) -> Result<Arc<TableDescriptor>> {
        let declared = E::descriptor()?;
        let stored = self.reflect_table(ctx, declared.name()).await?;

        for column in declared.columns() {
            let Some(found) = stored.get_column(&column.name) else {
                return Err(SchemaError::ColumnMissing {
                    table: declared.name().to_string(),
                    column: column.name.clone(),
                }
                .into());
            };

            if found.semantic_type != column.semantic_type {
                return Err(SchemaError::TypeMismatch {
                    table: declared.name().to_string(),
                    column: column.name.clone(),
                    declared: column.semantic_type.to_string(),
                    stored: found.semantic_type.to_string(),
                }
                .into());
            }

            if key_role(found) != key_role(column) {
                return Err(SchemaError::KeyMismatch {
                    table: declared.name().to_string(),
                    column: column.name.clone(),
                    declared: key_role(column).to_string(),
                    stored: key_role(found).to_string(),
                }
                .into());
            }
        }

        Ok(Arc::new(declared))
    }

    async fn reflect_table(&self, ctx: &Context, table: &str) -> Result<TableDescriptor> {
        let mut guard = self.pool.acquire(ctx).await?;

        let outcome = ctx.run(guard.connection().table_exists(table)).await;
        if !guard.settle(outcome)? {
            return Err(SchemaError::NotFound(table.to_string()).into());
        }

        let outcome = ctx.run(guard.connection().describe_table(table)).await;
        let mut metadata = guard.settle(outcome)?;
        drop(guard);

        metadata.sort_by_key(|column| column.ordinal);

        let columns = metadata
            .into_iter()
            .map(|column| {
                let semantic_type = SemanticType::from_storage_type(&column.storage_type)
                    .ok_or_else(|| SchemaError::Unsupported {
                        table: table.to_string(),
                        column: column.name.clone(),
                        storage_type: column.storage_type.clone(),
                    })?;
                Ok(ColumnDescriptor {
                    name: column.name,
                    semantic_type,
                    primary_key: column.primary_key,
                    unique: column.unique,
                })
            })
            .collect::<std::result::Result<Vec<_>, SchemaError>>()?;

        debug!(table, columns = columns.len(), "reflected table");
        Ok(TableDescriptor::new(table, columns)?)
    }
}

fn key_role(column: &ColumnDescriptor) -> &'static str {
    if column.primary_key {
        "primary key"
    } else if column.unique {
        "unique"
    } else {
        "non-key"
    }
}
