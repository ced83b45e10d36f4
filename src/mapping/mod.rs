#![forbid(unsafe_code)]
//! Column bindings, object materialization and table bindings.

mod accessor_map;
mod cache;
mod materializer;
mod once_map;
mod sql;
mod table;

pub use accessor_map::ColumnToAccessorMap;
pub use cache::{MappingCache, MappingCacheRegistry, DEFAULT_CACHE_NAME};
pub use materializer::ColumnsMapping;
pub use sql::TableSql;
pub use table::{InsertResult, Operation, TableMapping};

pub(crate) use once_map::OnceMap;
pub(crate) use table::{execute, RowSource};

/// Case- and separator-insensitive form of a column or parameter name.
///
/// `user_id`, `userId`, `USER-ID` and `user id` all map to `USERID`.
pub fn canonical(name: &str) -> String {
    name.chars()
        .filter(|c| !matches!(c, '_' | '-') && !c.is_whitespace())
        .flat_map(char::to_uppercase)
        .collect()
}
