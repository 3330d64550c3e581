use thiserror::Error;

/// Structural problems with a table description.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("Table '{0}' not found")]
    NotFound(String),

    #[error("Column '{column}' of table '{table}' has unsupported storage type '{storage_type}'")]
    Unsupported {
        table: String,
        column: String,
        storage_type: String,
    },

    #[error("Column '{column}' is declared for table '{table}' but absent from the store")]
    ColumnMissing { table: String, column: String },

    #[error("Column '{column}' of table '{table}' is declared as {declared} but stored as {stored}")]
    TypeMismatch {
        table: String,
        column: String,
        declared: String,
        stored: String,
    },

    #[error("Column '{column}' of table '{table}' is declared as {declared} but stored as {stored}")]
    KeyMismatch {
        table: String,
        column: String,
        declared: String,
        stored: String,
    },

    #[error("Invalid table definition: {0}")]
    InvalidDefinition(String),
}

/// Problems detected while binding a contract or policy to a table.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BindingError {
    #[error("Column '{column}' not found in table '{table}'")]
    UnknownColumn { table: String, column: String },

    #[error("Columns ({}) of table '{table}' do not form a declared primary or unique key", .columns.join(", "))]
    InvalidConflictTarget { table: String, columns: Vec<String> },

    #[error("Invalid contract for method '{method}': {reason}")]
    InvalidContract { method: String, reason: String },

    #[error("Method '{method}' is not registered for table '{table}'")]
    UnknownMethod { table: String, method: String },

    #[error("Method '{method}' is already registered for table '{table}' with a different contract")]
    DuplicateMethod { table: String, method: String },
}

/// Runtime failures while talking to the store or decoding its answers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecutionError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Operation timed out")]
    TimedOut,

    #[error("Expected {expected}, store returned {actual}")]
    CardinalityMismatch { expected: String, actual: String },

    #[error("Value {value} does not fit into {target}")]
    Overflow { value: String, target: String },

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("Argument mismatch: {0}")]
    ArgumentMismatch(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Statement rejected by store: {0}")]
    Rejected(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Binding(#[from] BindingError),

    #[error(transparent)]
    Execution(#[from] ExecutionError),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Only transport failures are worth retrying; everything else is either
    /// structural or a contract/data mismatch.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Execution(ExecutionError::Unavailable(_)))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            Self::Execution(ExecutionError::Cancelled | ExecutionError::TimedOut)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
