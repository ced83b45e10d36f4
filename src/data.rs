#![forbid(unsafe_code)]
use crate::error::ConversionError;
use std::fmt;

////////////////////////////////////////////////////////////////////////////////

/// Declared value type of an object member or constructor parameter.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash)]
pub enum DataType {
    Int64,
    Int32,
    Float64,
    Bool,
    String,
    Bytes,
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataType::Int64 => "i64",
            DataType::Int32 => "i32",
            DataType::Float64 => "f64",
            DataType::Bool => "bool",
            DataType::String => "String",
            DataType::Bytes => "Vec<u8>",
        };
        f.write_str(name)
    }
}

////////////////////////////////////////////////////////////////////////////////

#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Null,
    Int64(i64),
    Int32(i32),
    Float64(f64),
    Bool(bool),
    String(String),
    Bytes(Vec<u8>),
}

impl Value {
    pub fn data_type(&self) -> Option<DataType> {
        match self {
            Value::Null => None,
            Value::Int64(_) => Some(DataType::Int64),
            Value::Int32(_) => Some(DataType::Int32),
            Value::Float64(_) => Some(DataType::Float64),
            Value::Bool(_) => Some(DataType::Bool),
            Value::String(_) => Some(DataType::String),
            Value::Bytes(_) => Some(DataType::Bytes),
        }
    }

    /// Runtime type name used in diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Int64(_) => "i64",
            Value::Int32(_) => "i32",
            Value::Float64(_) => "f64",
            Value::Bool(_) => "bool",
            Value::String(_) => "String",
            Value::Bytes(_) => "Vec<u8>",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Int64(x) => write!(f, "{}", x),
            Value::Int32(x) => write!(f, "{}", x),
            Value::Float64(x) => write!(f, "{}", x),
            Value::Bool(x) => write!(f, "{}", x),
            Value::String(s) => write!(f, "'{}'", s),
            Value::Bytes(b) => write!(f, "<{} bytes>", b.len()),
        }
    }
}

////////////////////////////////////////////////////////////////////////////////

/// A Rust type that can be stored in a single column.
pub trait SqlValue: Sized {
    const DATA_TYPE: DataType;

    fn to_value(&self) -> Value;
    fn from_value(value: Value) -> Result<Self, ConversionError>;
}

macro_rules! impl_sql_value {
    ($ty:ty, $variant:ident) => {
        impl SqlValue for $ty {
            const DATA_TYPE: DataType = DataType::$variant;

            fn to_value(&self) -> Value {
                Value::$variant(self.clone())
            }

            fn from_value(value: Value) -> Result<Self, ConversionError> {
                match value {
                    Value::$variant(x) => Ok(x),
                    other => Err(ConversionError::new(DataType::$variant, &other)),
                }
            }
        }
    };
}

impl_sql_value!(i64, Int64);
impl_sql_value!(i32, Int32);
impl_sql_value!(f64, Float64);
impl_sql_value!(bool, Bool);
impl_sql_value!(String, String);
impl_sql_value!(Vec<u8>, Bytes);

impl<T: SqlValue> SqlValue for Option<T> {
    const DATA_TYPE: DataType = T::DATA_TYPE;

    fn to_value(&self) -> Value {
        match self {
            Some(x) => x.to_value(),
            None => Value::Null,
        }
    }

    fn from_value(value: Value) -> Result<Self, ConversionError> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

////////////////////////////////////////////////////////////////////////////////

/// Translates a raw column value, as read from the database, into the value
/// representation of a declared member type.
pub trait ColumnValueConverter: Send + Sync {
    fn convert(&self, value: Value, target: DataType) -> Result<Value, ConversionError>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultColumnValueConverter;

impl ColumnValueConverter for DefaultColumnValueConverter {
    fn convert(&self, value: Value, target: DataType) -> Result<Value, ConversionError> {
        if value.is_null() || value.data_type() == Some(target) {
            return Ok(value);
        }

        match (value, target) {
            (Value::Int64(x), DataType::Int32) => i32::try_from(x)
                .map(Value::Int32)
                .map_err(|_| ConversionError::new(target, &Value::Int64(x))),
            (Value::Int32(x), DataType::Int64) => Ok(Value::Int64(x.into())),
            (Value::Int64(x), DataType::Bool) => Ok(Value::Bool(x != 0)),
            (Value::Int32(x), DataType::Bool) => Ok(Value::Bool(x != 0)),
            (Value::Bool(x), DataType::Int64) => Ok(Value::Int64(x.into())),
            (Value::Bool(x), DataType::Int32) => Ok(Value::Int32(x.into())),
            (Value::Int64(x), DataType::Float64) => Ok(Value::Float64(x as f64)),
            (Value::Int32(x), DataType::Float64) => Ok(Value::Float64(x.into())),
            (Value::String(s), DataType::Bytes) => Ok(Value::Bytes(s.into_bytes())),
            (other, target) => Err(ConversionError::new(target, &other)),
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
