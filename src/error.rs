#![forbid(unsafe_code)]
use crate::{
    data::{DataType, Value},
    mapping::Operation,
};
use thiserror::Error;

////////////////////////////////////////////////////////////////////////////////

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Config(Box<ConfigError>),
    #[error(transparent)]
    Precondition(Box<PreconditionError>),
    #[error(transparent)]
    Materialize(Box<MaterializeError>),
    #[error("generated keys cursor returned {got} rows for {expected} inserted objects")]
    GeneratedKeyCount { expected: usize, got: usize },
    #[error("database is locked")]
    LockConflict,
    #[error("storage error: {0}")]
    Storage(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error {
                    code: rusqlite::ErrorCode::DatabaseBusy,
                    ..
                },
                _,
            ) => Error::LockConflict,
            _ => Error::Storage(Box::new(err)),
        }
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Error::Config(Box::new(err))
    }
}

impl From<PreconditionError> for Error {
    fn from(err: PreconditionError) -> Self {
        Error::Precondition(Box::new(err))
    }
}

impl From<MaterializeError> for Error {
    fn from(err: MaterializeError) -> Self {
        Error::Materialize(Box::new(err))
    }
}

impl Error {
    pub fn is_config(&self) -> bool {
        matches!(self, Error::Config(_))
    }

    pub fn is_precondition(&self) -> bool {
        matches!(self, Error::Precondition(_))
    }
}

////////////////////////////////////////////////////////////////////////////////

/// Raised while a binding is being built. Never retried.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("type '{type_name}' declares {count} designated constructors, at most one is allowed")]
    AmbiguousConstructor { type_name: &'static str, count: usize },

    #[error("type '{type_name}' has neither a designated constructor nor a zero-argument constructor")]
    NoConstructor { type_name: &'static str },

    #[error(
        "columns of table '{table}' do not match type '{type_name}': \
        missing in type {missing_in_type:?}, missing in table {missing_in_table:?}"
    )]
    ColumnMismatch {
        type_name: &'static str,
        table: String,
        missing_in_type: Vec<String>,
        missing_in_table: Vec<String>,
    },

    #[error(
        "column alias prefix '{prefix}' concatenated with column '{column}' \
        duplicates an existing column"
    )]
    AliasCollision { prefix: String, column: String },

    #[error("type '{type_name}' binds column '{column}' more than once")]
    DuplicateColumn {
        type_name: &'static str,
        column: String,
    },

    #[error("column '{column}' of type '{type_name}' has neither a getter nor a setter")]
    InaccessibleColumn {
        type_name: &'static str,
        column: String,
    },

    #[error("table '{table}' is not found")]
    TableNotFound { table: String },

    #[error("invalid configuration: {name} must be at least 1, got {value}")]
    InvalidSize { name: &'static str, value: usize },
}

////////////////////////////////////////////////////////////////////////////////

/// Raised before any SQL is issued.
#[derive(Error, Debug)]
pub enum PreconditionError {
    #[error("cannot read parameters from a null instance of '{type_name}'")]
    NullObject { type_name: &'static str },

    #[error("{operation} requires primary keys but table '{table}' has none")]
    MissingPrimaryKey { table: String, operation: Operation },

    #[error("{operation} requires no generated columns but table '{table}' has {columns:?}")]
    GeneratedColumns {
        table: String,
        operation: Operation,
        columns: Vec<String>,
    },

    #[error("column '{column}' of type '{type_name}' has no readable accessor")]
    Unreadable {
        type_name: &'static str,
        column: String,
    },

    #[error("statement expects {expected} parameters, got {got}")]
    ParameterCount { expected: usize, got: usize },
}

////////////////////////////////////////////////////////////////////////////////

#[derive(Error, Debug)]
#[error(
    "cannot materialize {type_name} from column '{column}': \
    expected equivalent of {target_type}, got {value_type}"
)]
pub struct MaterializeError {
    pub type_name: &'static str,
    pub column: String,
    pub target_type: DataType,
    pub value_type: &'static str,
    #[source]
    pub source: ConversionError,
}

impl MaterializeError {
    pub(crate) fn new(type_name: &'static str, column: &str, source: ConversionError) -> Self {
        Self {
            type_name,
            column: column.to_string(),
            target_type: source.expected,
            value_type: source.got,
            source,
        }
    }
}

////////////////////////////////////////////////////////////////////////////////

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("cannot convert {got} into {expected}")]
pub struct ConversionError {
    pub expected: DataType,
    pub got: &'static str,
    /// Member that rejected the value, when known.
    pub field: Option<&'static str>,
}

impl ConversionError {
    pub fn new(expected: DataType, got: &Value) -> Self {
        Self {
            expected,
            got: got.type_name(),
            field: None,
        }
    }

    pub fn for_field(mut self, field: &'static str) -> Self {
        self.field = Some(field);
        self
    }
}

////////////////////////////////////////////////////////////////////////////////

pub type Result<T, E = Error> = std::result::Result<T, E>;
