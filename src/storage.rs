#![forbid(unsafe_code)]
use crate::{data::Value, error::Result, mapping::canonical};
use std::{fmt, sync::Arc};

////////////////////////////////////////////////////////////////////////////////

/// A database connection. Not meant for concurrent use: one logical unit of
/// work per connection at a time.
pub trait Connection {
    fn prepare(&self, sql: &str) -> Result<Box<dyn Statement + '_>>;

    /// Prepares an insert whose generated values for `key_columns` can be
    /// fetched with [`Statement::generated_keys`].
    fn prepare_with_generated_keys(
        &self,
        sql: &str,
        key_columns: &[String],
    ) -> Result<Box<dyn Statement + '_>>;

    fn auto_commit(&self) -> Result<bool>;
    fn set_auto_commit(&self, auto_commit: bool) -> Result<()>;
    fn commit(&self) -> Result<()>;
    fn rollback(&self) -> Result<()>;

    /// Catalog lookup. `None` when the table does not exist.
    fn table_metadata(&self, table: &str) -> Result<Option<TableMetadata>>;
}

/// A parameterized statement.
pub trait Statement {
    fn set_parameters(&mut self, parameters: &[Value]) -> Result<()>;

    fn execute_update(&mut self) -> Result<usize>;

    /// Queues the current parameters for [`Statement::execute_batch`].
    fn add_batch(&mut self) -> Result<()>;
    /// One update count per queued parameter set, in queue order.
    fn execute_batch(&mut self) -> Result<Vec<usize>>;

    fn query(&mut self) -> Result<Box<dyn RowCursor + '_>>;

    /// Keys generated by executions since the previous call, in the order the
    /// database reported them.
    fn generated_keys(&mut self) -> Result<GeneratedKeys>;
}

pub trait RowCursor {
    fn shape(&self) -> &RowShape;
    fn next_row(&mut self) -> Result<Option<Vec<Value>>>;
}

////////////////////////////////////////////////////////////////////////////////

/// Ordered column labels of one query result. Cheap to clone and usable as a
/// cache key.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct RowShape(Arc<[String]>);

impl RowShape {
    pub fn new<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(labels.into_iter().map(Into::into).collect())
    }

    pub fn labels(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for RowShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.0.iter()).finish()
    }
}

////////////////////////////////////////////////////////////////////////////////

#[derive(Clone, Debug, Default, PartialEq)]
pub struct GeneratedKeys {
    pub shape: RowShape,
    pub rows: Vec<Vec<Value>>,
}

impl Default for RowShape {
    fn default() -> Self {
        Self::new(Vec::<String>::new())
    }
}

////////////////////////////////////////////////////////////////////////////////

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TableMetadata {
    pub name: String,
    pub columns: Vec<String>,
    /// Ordered by key position.
    pub primary_keys: Vec<String>,
    pub generated_columns: Vec<String>,
}

impl TableMetadata {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_primary_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.primary_keys = keys.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_generated_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.generated_columns = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn is_primary_key(&self, column: &str) -> bool {
        contains_canonical(&self.primary_keys, column)
    }

    pub fn is_generated(&self, column: &str) -> bool {
        contains_canonical(&self.generated_columns, column)
    }
}

fn contains_canonical(names: &[String], column: &str) -> bool {
    let column = canonical(column);
    names.iter().any(|name| canonical(name) == column)
}
