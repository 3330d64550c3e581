pub mod reflector;

pub use reflector::{ReflectSource, SchemaReflector};

use serde::{Deserialize, Serialize};

use crate::core::{ColumnDescriptor, Row, SchemaError, TableDescriptor};
use crate::result::FromRecord;

/// Declared shape of a persistent type: its table and its fields in
/// declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityDefinition {
    pub table: String,
    pub fields: Vec<ColumnDescriptor>,
}

impl EntityDefinition {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            fields: Vec::new(),
        }
    }

    pub fn field(mut self, column: ColumnDescriptor) -> Self {
        self.fields.push(column);
        self
    }

    pub fn to_descriptor(&self) -> Result<TableDescriptor, SchemaError> {
        TableDescriptor::new(self.table.clone(), self.fields.clone())
    }
}

/// A Rust type mapped onto one table row.
///
/// Usually derived:
///
/// ```
/// use tablebind::Entity;
///
/// #[derive(Debug, Entity)]
/// #[entity(table = "versions")]
/// struct Version {
///     #[column(primary_key)]
///     id: i64,
///     version: u8,
/// }
///
/// assert_eq!(Version::table_name(), "versions");
/// assert_eq!(Version::definition().fields.len(), 2);
/// ```
pub trait Entity: FromRecord + Send + Sync + 'static {
    fn table_name() -> &'static str;

    fn definition() -> EntityDefinition;

    /// Field values in the order of `definition().fields`.
    fn to_row(&self) -> Row;

    fn descriptor() -> Result<TableDescriptor, SchemaError> {
        Self::definition().to_descriptor()
    }
}
