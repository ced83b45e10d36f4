#![forbid(unsafe_code)]
//! Binds Rust types to relational tables: column accessors, row
//! materialization and bulk multi-row writes.

extern crate self as rowmap;

pub mod config;
pub mod connection;
pub mod data;
pub mod error;
pub mod mapping;
pub mod multirow;
pub mod object;
pub mod sqlite;
pub mod storage;

pub use config::{Config, MultiRowStrategy};
pub use connection::{ObjectMut, ObjectRef, OrmConnection};
pub use data::{ColumnValueConverter, DataType, DefaultColumnValueConverter, SqlValue, Value};
pub use error::{ConfigError, ConversionError, Error, MaterializeError, PreconditionError, Result};
pub use mapping::{
    ColumnToAccessorMap, ColumnsMapping, InsertResult, MappingCache, MappingCacheRegistry, Operation,
    TableMapping, TableSql, DEFAULT_CACHE_NAME,
};
pub use multirow::MultiRowProcessor;
pub use object::{Accessor, Capability, Constructor, ConstructorParameter, Mechanism, Object};
pub use rowmap_derive::Object;
pub use sqlite::SqliteConnection;
pub use storage::{Connection, GeneratedKeys, RowCursor, RowShape, Statement, TableMetadata};
