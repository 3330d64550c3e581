pub mod context;
pub mod error;
pub mod types;
pub mod value;

pub use context::{CancelHandle, Context};
pub use error::{BindingError, Error, ExecutionError, Result, SchemaError};
pub use types::{ColumnDescriptor, Row, SemanticType, TableDescriptor, is_valid_identifier, quote_identifier};
pub use value::{FromValue, Value};
