#![forbid(unsafe_code)]
use super::{canonical, ColumnToAccessorMap, TableSql};
use crate::{
    data::{ColumnValueConverter, Value},
    error::{ConfigError, Error, MaterializeError, PreconditionError, Result},
    multirow::{MultiRowProcessor, SimpleBatch},
    object::Object,
    storage::{Connection, GeneratedKeys, Statement, TableMetadata},
};
use std::{collections::BTreeSet, fmt, sync::Arc};
use tracing::{debug, trace};

////////////////////////////////////////////////////////////////////////////////

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    Insert,
    Merge,
    Update,
    Delete,
    SelectByPrimaryKey,
    Exists,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Insert => "insert",
            Operation::Merge => "merge",
            Operation::Update => "update",
            Operation::Delete => "delete",
            Operation::SelectByPrimaryKey => "select by primary key",
            Operation::Exists => "exists",
        };
        f.write_str(name)
    }
}

////////////////////////////////////////////////////////////////////////////////

/// An object handed to a bulk write. Only mutable sources receive
/// generated keys.
pub(crate) trait RowSource<T> {
    fn object(&self) -> &T;
    fn object_mut(&mut self) -> Option<&mut T>;
}

impl<T> RowSource<T> for &T {
    fn object(&self) -> &T {
        self
    }

    fn object_mut(&mut self) -> Option<&mut T> {
        None
    }
}

impl<T> RowSource<T> for &mut T {
    fn object(&self) -> &T {
        self
    }

    fn object_mut(&mut self) -> Option<&mut T> {
        Some(self)
    }
}

////////////////////////////////////////////////////////////////////////////////

#[derive(Clone, Debug, Default, PartialEq)]
pub struct InsertResult {
    pub rows_modified: Vec<usize>,
    /// Generated values in the order the database reported them.
    pub generated_keys: Vec<Value>,
}

impl InsertResult {
    pub fn total_rows_modified(&self) -> usize {
        self.rows_modified.iter().sum()
    }
}

////////////////////////////////////////////////////////////////////////////////

/// Binds an object type to one physical table.
///
/// Holds the parameter column lists of every write, the statement text and
/// the bulk write strategy. Immutable once built.
pub struct TableMapping<T> {
    table: String,
    columns: Arc<ColumnToAccessorMap<T>>,
    converter: Arc<dyn ColumnValueConverter>,
    all_columns: Vec<String>,
    primary_keys: Vec<String>,
    generated_columns: Vec<String>,
    insert_columns: Vec<String>,
    update_columns: Vec<String>,
    sql: TableSql,
    processor: Box<dyn MultiRowProcessor<T>>,
}

impl<T: Object> TableMapping<T> {
    pub fn new(
        columns: Arc<ColumnToAccessorMap<T>>,
        converter: Arc<dyn ColumnValueConverter>,
        metadata: TableMetadata,
        processor: Box<dyn MultiRowProcessor<T>>,
    ) -> Result<Self> {
        verify_columns(&columns, &metadata)?;

        let TableMetadata {
            name: table,
            columns: all_columns,
            primary_keys,
            generated_columns,
        } = metadata;

        let generated = generated_columns.iter().map(|c| canonical(c)).collect::<BTreeSet<_>>();
        let keys = primary_keys.iter().map(|c| canonical(c)).collect::<BTreeSet<_>>();

        let insert_columns = all_columns
            .iter()
            .filter(|column| !generated.contains(&canonical(column)))
            .cloned()
            .collect::<Vec<_>>();
        let update_columns = all_columns
            .iter()
            .filter(|column| !keys.contains(&canonical(column)))
            .chain(primary_keys.iter())
            .cloned()
            .collect::<Vec<_>>();

        let sql = TableSql::new(&table, &all_columns, &insert_columns, &update_columns, &primary_keys);

        let mapping = Self {
            table,
            columns,
            converter,
            all_columns,
            primary_keys,
            generated_columns,
            insert_columns,
            update_columns,
            sql,
            processor,
        };
        debug!(
            type_name = T::TYPE_NAME,
            table = %mapping.table,
            strategy = mapping.processor.name(),
            "built table mapping"
        );
        trace!("{}", mapping);
        Ok(mapping)
    }
}

fn verify_columns<T>(columns: &ColumnToAccessorMap<T>, metadata: &TableMetadata) -> Result<()> {
    let in_type = columns.column_names().map(canonical).collect::<BTreeSet<_>>();
    let in_table = metadata.columns.iter().map(|c| canonical(c)).collect::<BTreeSet<_>>();
    if in_type == in_table {
        return Ok(());
    }

    Err(ConfigError::ColumnMismatch {
        type_name: columns.type_name(),
        table: metadata.name.clone(),
        missing_in_type: in_table.difference(&in_type).cloned().collect(),
        missing_in_table: in_type.difference(&in_table).cloned().collect(),
    }
    .into())
}

impl<T> TableMapping<T> {
    pub fn type_name(&self) -> &'static str {
        self.columns.type_name()
    }

    pub fn table_name(&self) -> &str {
        &self.table
    }

    pub fn columns(&self) -> &ColumnToAccessorMap<T> {
        &self.columns
    }

    /// Physical columns in table order.
    pub fn all_columns(&self) -> &[String] {
        &self.all_columns
    }

    pub fn primary_keys(&self) -> &[String] {
        &self.primary_keys
    }

    pub fn generated_columns(&self) -> &[String] {
        &self.generated_columns
    }

    /// All columns minus generated ones. Used by insert and merge.
    pub fn insert_columns(&self) -> &[String] {
        &self.insert_columns
    }

    /// Non-key columns followed by key columns.
    pub fn update_columns(&self) -> &[String] {
        &self.update_columns
    }

    pub fn sql(&self) -> &TableSql {
        &self.sql
    }

    pub fn processor_name(&self) -> &'static str {
        self.processor.name()
    }

    ////////////////////////////////////////////////////////////////////////////

    /// Reads `columns` from `object` in order.
    pub fn parameters_for(&self, object: Option<&T>, columns: &[String]) -> Result<Vec<Value>> {
        let object = object.ok_or(PreconditionError::NullObject {
            type_name: self.type_name(),
        })?;
        columns
            .iter()
            .map(|column| self.columns.get_value(object, column))
            .collect()
    }

    pub fn insert_parameters(&self, object: &T) -> Result<Vec<Value>> {
        self.parameters_for(Some(object), &self.insert_columns)
    }

    pub fn update_parameters(&self, object: &T) -> Result<Vec<Value>> {
        self.require_primary_keys(Operation::Update)?;
        self.parameters_for(Some(object), &self.update_columns)
    }

    pub fn primary_key_parameters(&self, object: &T) -> Result<Vec<Value>> {
        self.require_primary_keys(Operation::Delete)?;
        self.parameters_for(Some(object), &self.primary_keys)
    }

    pub fn require_primary_keys(&self, operation: Operation) -> Result<()> {
        if self.primary_keys.is_empty() {
            return Err(PreconditionError::MissingPrimaryKey {
                table: self.table.clone(),
                operation,
            }
            .into());
        }
        Ok(())
    }

    pub fn require_no_generated_columns(&self, operation: Operation) -> Result<()> {
        if !self.generated_columns.is_empty() {
            return Err(PreconditionError::GeneratedColumns {
                table: self.table.clone(),
                operation,
                columns: self.generated_columns.clone(),
            }
            .into());
        }
        Ok(())
    }

    /// Statement text of a key-dependent operation, after the key check.
    fn keyed_sql(&self, operation: Operation) -> Result<&str> {
        self.require_primary_keys(operation)?;
        let sql = match operation {
            Operation::Update => self.sql.update(),
            Operation::Delete => self.sql.delete(),
            Operation::SelectByPrimaryKey => self.sql.select_by_primary_key(),
            Operation::Exists => self.sql.exists(),
            Operation::Insert => Some(self.sql.insert()),
            Operation::Merge => Some(self.sql.merge()),
        };
        sql.ok_or_else(|| {
            PreconditionError::MissingPrimaryKey {
                table: self.table.clone(),
                operation,
            }
            .into()
        })
    }

    pub fn select_by_primary_key_sql(&self) -> Result<&str> {
        self.keyed_sql(Operation::SelectByPrimaryKey)
    }

    pub fn exists_sql(&self) -> Result<&str> {
        self.keyed_sql(Operation::Exists)
    }

    ////////////////////////////////////////////////////////////////////////////

    pub fn insert(&self, conn: &dyn Connection, object: &T) -> Result<usize> {
        let parameters = self.insert_parameters(object)?;
        execute(conn, self.sql.insert(), &parameters)
    }

    /// Inserts `object` and writes the generated keys back onto it.
    pub fn insert_and_get(&self, conn: &dyn Connection, object: &mut T) -> Result<InsertResult> {
        let parameters = self.insert_parameters(object)?;
        let sql = self.sql.insert();
        let mut stmt = if self.generated_columns.is_empty() {
            conn.prepare(sql)?
        } else {
            conn.prepare_with_generated_keys(sql, &self.generated_columns)?
        };
        trace!(sql, parameters = parameters.len(), "insert and get");
        stmt.set_parameters(&parameters)?;
        let rows_modified = stmt.execute_update()?;

        let generated_keys = if self.generated_columns.is_empty() {
            Vec::new()
        } else {
            let keys = stmt.generated_keys()?;
            self.apply_generated_keys(&mut [object], keys)?
        };

        Ok(InsertResult {
            rows_modified: vec![rows_modified],
            generated_keys,
        })
    }

    pub fn merge(&self, conn: &dyn Connection, object: &T) -> Result<usize> {
        self.require_no_generated_columns(Operation::Merge)?;
        let parameters = self.insert_parameters(object)?;
        execute(conn, self.sql.merge(), &parameters)
    }

    pub fn update(&self, conn: &dyn Connection, object: &T) -> Result<usize> {
        let sql = self.keyed_sql(Operation::Update)?;
        let parameters = self.update_parameters(object)?;
        execute(conn, sql, &parameters)
    }

    pub fn delete(&self, conn: &dyn Connection, object: &T) -> Result<usize> {
        let sql = self.keyed_sql(Operation::Delete)?;
        let parameters = self.primary_key_parameters(object)?;
        execute(conn, sql, &parameters)
    }

    ////////////////////////////////////////////////////////////////////////////

    pub fn insert_all<'o>(
        &self,
        conn: &dyn Connection,
        objects: impl IntoIterator<Item = Option<&'o mut T>>,
    ) -> Result<Vec<usize>>
    where
        T: 'o,
    {
        let objects = objects.into_iter().collect::<Vec<_>>();
        if self.insert_columns.is_empty() {
            // Every column is generated: one `DEFAULT VALUES` insert per object.
            return SimpleBatch::new(self.processor.batch_size()).multi_row_insert(self, conn, objects);
        }
        self.processor.multi_row_insert(self, conn, objects)
    }

    pub fn merge_all<'o>(
        &self,
        conn: &dyn Connection,
        objects: impl IntoIterator<Item = Option<&'o T>>,
    ) -> Result<Vec<usize>>
    where
        T: 'o,
    {
        self.require_no_generated_columns(Operation::Merge)?;
        self.processor
            .multi_row_merge(self, conn, objects.into_iter().collect())
    }

    pub fn update_all<'o>(
        &self,
        conn: &dyn Connection,
        objects: impl IntoIterator<Item = Option<&'o T>>,
    ) -> Result<Vec<usize>>
    where
        T: 'o,
    {
        let sql = self.keyed_sql(Operation::Update)?;
        self.processor.batch(
            self,
            conn,
            sql,
            &|object| self.update_parameters(object),
            objects.into_iter().collect(),
        )
    }

    pub fn delete_all<'o>(
        &self,
        conn: &dyn Connection,
        objects: impl IntoIterator<Item = Option<&'o T>>,
    ) -> Result<Vec<usize>>
    where
        T: 'o,
    {
        let sql = self.keyed_sql(Operation::Delete)?;
        self.processor.batch(
            self,
            conn,
            sql,
            &|object| self.primary_key_parameters(object),
            objects.into_iter().collect(),
        )
    }

    pub fn delete_all_rows(&self, conn: &dyn Connection) -> Result<usize> {
        execute(conn, self.sql.delete_all(), &[])
    }

    ////////////////////////////////////////////////////////////////////////////

    /// Writes each generated key row back onto the matching object, in
    /// cursor order, and returns the written values.
    pub(crate) fn apply_generated_keys<R: RowSource<T>>(
        &self,
        rows: &mut [R],
        keys: GeneratedKeys,
    ) -> Result<Vec<Value>> {
        if keys.rows.len() != rows.len() {
            return Err(Error::GeneratedKeyCount {
                expected: rows.len(),
                got: keys.rows.len(),
            });
        }

        let mut values = Vec::with_capacity(keys.rows.len() * keys.shape.len());
        for (row, key_row) in rows.iter_mut().zip(keys.rows) {
            for (label, value) in keys.shape.labels().iter().zip(key_row) {
                let value = match self.columns.resolve(label) {
                    Some(accessor) => self
                        .converter
                        .convert(value, accessor.data_type())
                        .map_err(|err| MaterializeError::new(self.type_name(), label, err))?,
                    None => value,
                };
                if let Some(object) = row.object_mut() {
                    self.columns.set_value(object, label, value.clone())?;
                }
                values.push(value);
            }
        }
        Ok(values)
    }

    fn returns_generated_keys(&self, operation: Operation) -> bool {
        operation == Operation::Insert && !self.generated_columns.is_empty()
    }

    pub(crate) fn prepare_multi_row<'c>(
        &self,
        conn: &'c dyn Connection,
        operation: Operation,
        rows: usize,
    ) -> Result<Box<dyn Statement + 'c>> {
        let sql: Arc<str> = match (operation, rows) {
            (Operation::Merge, 1) => self.sql.merge().into(),
            (Operation::Merge, _) => self.sql.multi_row_merge(rows),
            (_, 1) => self.sql.insert().into(),
            _ => self.sql.multi_row_insert(rows),
        };
        trace!(sql = &*sql, rows, "prepare multi-row statement");
        if self.returns_generated_keys(operation) {
            conn.prepare_with_generated_keys(&sql, &self.generated_columns)
        } else {
            conn.prepare(&sql)
        }
    }

    pub(crate) fn set_rows_parameters<R: RowSource<T>>(
        &self,
        stmt: &mut dyn Statement,
        rows: &[R],
    ) -> Result<()> {
        let mut parameters = Vec::with_capacity(rows.len() * self.insert_columns.len());
        for row in rows {
            parameters.extend(self.insert_parameters(row.object())?);
        }
        stmt.set_parameters(&parameters)
    }

    /// No-op unless `operation` is an insert into a table with generated
    /// columns.
    pub(crate) fn fetch_generated_keys<R: RowSource<T>>(
        &self,
        stmt: &mut dyn Statement,
        operation: Operation,
        rows: &mut [R],
    ) -> Result<()> {
        if !self.returns_generated_keys(operation) || rows.is_empty() {
            return Ok(());
        }
        let keys = stmt.generated_keys()?;
        self.apply_generated_keys(rows, keys).map(|_| ())
    }

    pub(crate) fn execute_partition<R: RowSource<T>>(
        &self,
        stmt: &mut dyn Statement,
        operation: Operation,
        rows: &mut [R],
    ) -> Result<usize> {
        self.set_rows_parameters(stmt, rows)?;
        let count = stmt.execute_update()?;
        self.fetch_generated_keys(stmt, operation, rows)?;
        Ok(count)
    }
}

impl<T> fmt::Display for TableMapping<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "[{}] is mapped to [{}] table, keys {:?}, generated {:?}",
            self.type_name(),
            self.table,
            self.primary_keys,
            self.generated_columns
        )?;
        writeln!(f, "{}", self.columns)?;
        writeln!(f, "{}", self.sql)?;
        write!(f, "  with [{}]", self.processor.name())
    }
}

pub(crate) fn execute(conn: &dyn Connection, sql: &str, parameters: &[Value]) -> Result<usize> {
    trace!(sql, parameters = parameters.len(), "execute update");
    let mut stmt = conn.prepare(sql)?;
    stmt.set_parameters(parameters)?;
    stmt.execute_update()
}
