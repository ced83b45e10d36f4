#![forbid(unsafe_code)]
use crate::{
    data::Value,
    error::{Error, PreconditionError, Result},
    storage::{Connection, GeneratedKeys, RowCursor, RowShape, Statement, TableMetadata},
};
use rusqlite::{
    types::{ToSqlOutput, ValueRef},
    ToSql,
};
use std::{cell::Cell, mem, path::Path};
use tracing::trace;

////////////////////////////////////////////////////////////////////////////////

/// [`Connection`] over a SQLite database.
///
/// SQLite has no client-side auto-commit switch, so turning auto-commit off
/// opens a transaction with `BEGIN` and every commit or rollback opens the
/// next one.
pub struct SqliteConnection {
    inner: rusqlite::Connection,
    auto_commit: Cell<bool>,
}

impl SqliteConnection {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::from_connection(rusqlite::Connection::open(path)?))
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self::from_connection(rusqlite::Connection::open_in_memory()?))
    }

    pub fn from_connection(inner: rusqlite::Connection) -> Self {
        let auto_commit = inner.is_autocommit();
        Self {
            inner,
            auto_commit: Cell::new(auto_commit),
        }
    }

    pub fn inner(&self) -> &rusqlite::Connection {
        &self.inner
    }

    /// Runs semicolon-separated statements without parameters.
    pub fn execute_script(&self, sql: &str) -> Result<()> {
        self.inner.execute_batch(sql)?;
        Ok(())
    }

    fn end_transaction(&self, verb: &str) -> Result<()> {
        if !self.inner.is_autocommit() {
            self.inner.execute_batch(verb)?;
        }
        Ok(())
    }
}

impl Connection for SqliteConnection {
    fn prepare(&self, sql: &str) -> Result<Box<dyn Statement + '_>> {
        trace!(sql, "prepare");
        Ok(Box::new(SqliteStatement::new(self.inner.prepare(sql)?, false)))
    }

    fn prepare_with_generated_keys(
        &self,
        sql: &str,
        key_columns: &[String],
    ) -> Result<Box<dyn Statement + '_>> {
        let sql = format!("{} RETURNING {}", sql, key_columns.join(", "));
        trace!(sql = %sql, "prepare with generated keys");
        Ok(Box::new(SqliteStatement::new(self.inner.prepare(&sql)?, true)))
    }

    fn auto_commit(&self) -> Result<bool> {
        Ok(self.auto_commit.get())
    }

    fn set_auto_commit(&self, auto_commit: bool) -> Result<()> {
        if auto_commit == self.auto_commit.get() {
            return Ok(());
        }
        if auto_commit {
            self.end_transaction("COMMIT")?;
        } else {
            self.inner.execute_batch("BEGIN")?;
        }
        self.auto_commit.set(auto_commit);
        Ok(())
    }

    fn commit(&self) -> Result<()> {
        if !self.auto_commit.get() {
            self.end_transaction("COMMIT")?;
            self.inner.execute_batch("BEGIN")?;
        }
        Ok(())
    }

    fn rollback(&self) -> Result<()> {
        if !self.auto_commit.get() {
            self.end_transaction("ROLLBACK")?;
            self.inner.execute_batch("BEGIN")?;
        }
        Ok(())
    }

    fn table_metadata(&self, table: &str) -> Result<Option<TableMetadata>> {
        let mut stmt = self.inner.prepare(
            "SELECT name FROM sqlite_master WHERE type IN ('table', 'view') AND name = ?1 COLLATE NOCASE",
        )?;
        let name = match stmt.query_row([table], |row| row.get::<_, String>(0)) {
            Ok(name) => name,
            Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(None),
            Err(err) => return Err(err.into()),
        };

        let mut stmt = self
            .inner
            .prepare("SELECT name, type, pk, hidden FROM pragma_table_xinfo(?1) ORDER BY cid")?;
        let mut rows = stmt.query([name.as_str()])?;

        let mut columns = Vec::new();
        let mut keys = Vec::new();
        let mut generated = Vec::new();
        while let Some(row) = rows.next()? {
            let column: String = row.get(0)?;
            let declared: String = row.get(1)?;
            let pk: i64 = row.get(2)?;
            let hidden: i64 = row.get(3)?;

            if matches!(hidden, 2 | 3) {
                generated.push(column.clone());
            }
            if pk > 0 {
                keys.push((pk, column.clone(), declared));
            }
            columns.push(column);
        }
        keys.sort_by_key(|(position, _, _)| *position);

        // A sole INTEGER primary key aliases the rowid.
        if let [(_, column, declared)] = keys.as_slice() {
            if declared.eq_ignore_ascii_case("INTEGER") {
                generated.push(column.clone());
            }
        }

        Ok(Some(
            TableMetadata::new(name)
                .with_columns(columns)
                .with_primary_keys(keys.into_iter().map(|(_, column, _)| column))
                .with_generated_columns(generated),
        ))
    }
}

////////////////////////////////////////////////////////////////////////////////

struct SqliteStatement<'c> {
    inner: rusqlite::Statement<'c>,
    parameters: Vec<Value>,
    batch: Vec<Vec<Value>>,
    /// Rows returned by a `RETURNING` clause since the last fetch.
    keys: Option<Vec<Vec<Value>>>,
}

impl<'c> SqliteStatement<'c> {
    fn new(inner: rusqlite::Statement<'c>, returning: bool) -> Self {
        Self {
            inner,
            parameters: Vec::new(),
            batch: Vec::new(),
            keys: returning.then(Vec::new),
        }
    }

    fn shape(&self) -> RowShape {
        RowShape::new(self.inner.column_names())
    }
}

impl<'c> Statement for SqliteStatement<'c> {
    fn set_parameters(&mut self, parameters: &[Value]) -> Result<()> {
        let expected = self.inner.parameter_count();
        if parameters.len() != expected {
            return Err(PreconditionError::ParameterCount {
                expected,
                got: parameters.len(),
            }
            .into());
        }
        self.parameters = parameters.to_vec();
        Ok(())
    }

    fn execute_update(&mut self) -> Result<usize> {
        run(&mut self.inner, &self.parameters, self.keys.as_mut())
    }

    fn add_batch(&mut self) -> Result<()> {
        self.batch.push(self.parameters.clone());
        Ok(())
    }

    fn execute_batch(&mut self) -> Result<Vec<usize>> {
        mem::take(&mut self.batch)
            .iter()
            .map(|parameters| run(&mut self.inner, parameters, self.keys.as_mut()))
            .collect()
    }

    fn query(&mut self) -> Result<Box<dyn RowCursor + '_>> {
        bind(&mut self.inner, &self.parameters)?;
        let shape = self.shape();
        Ok(Box::new(SqliteCursor {
            rows: self.inner.raw_query(),
            shape,
        }))
    }

    fn generated_keys(&mut self) -> Result<GeneratedKeys> {
        let shape = self.shape();
        Ok(match self.keys.as_mut() {
            Some(keys) => GeneratedKeys {
                shape,
                rows: mem::take(keys),
            },
            None => GeneratedKeys::default(),
        })
    }
}

fn bind(stmt: &mut rusqlite::Statement<'_>, parameters: &[Value]) -> Result<()> {
    for (index, value) in parameters.iter().enumerate() {
        stmt.raw_bind_parameter(index + 1, value)?;
    }
    Ok(())
}

/// Executes once. Statements with a `RETURNING` clause collect the returned
/// rows into `keys` and report one modified row per returned row.
fn run(
    stmt: &mut rusqlite::Statement<'_>,
    parameters: &[Value],
    keys: Option<&mut Vec<Vec<Value>>>,
) -> Result<usize> {
    bind(stmt, parameters)?;
    match keys {
        None => Ok(stmt.raw_execute()?),
        Some(keys) => {
            let width = stmt.column_count();
            let mut rows = stmt.raw_query();
            let mut count = 0;
            while let Some(row) = rows.next()? {
                keys.push(read_row(row, width)?);
                count += 1;
            }
            Ok(count)
        }
    }
}

////////////////////////////////////////////////////////////////////////////////

struct SqliteCursor<'s> {
    rows: rusqlite::Rows<'s>,
    shape: RowShape,
}

impl<'s> RowCursor for SqliteCursor<'s> {
    fn shape(&self) -> &RowShape {
        &self.shape
    }

    fn next_row(&mut self) -> Result<Option<Vec<Value>>> {
        let width = self.shape.len();
        match self.rows.next()? {
            Some(row) => read_row(row, width).map(Some),
            None => Ok(None),
        }
    }
}

fn read_row(row: &rusqlite::Row<'_>, width: usize) -> Result<Vec<Value>> {
    (0..width)
        .map(|index| -> Result<Value> {
            Ok(match row.get_ref(index)? {
                ValueRef::Null => Value::Null,
                ValueRef::Integer(x) => Value::Int64(x),
                ValueRef::Real(x) => Value::Float64(x),
                ValueRef::Text(text) => Value::String(
                    String::from_utf8(text.to_vec()).map_err(|err| Error::Storage(Box::new(err)))?,
                ),
                ValueRef::Blob(bytes) => Value::Bytes(bytes.to_vec()),
            })
        })
        .collect()
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        match self {
            Value::Null => rusqlite::types::Null.to_sql(),
            Value::Int64(x) => x.to_sql(),
            Value::Int32(x) => x.to_sql(),
            Value::Float64(x) => x.to_sql(),
            Value::Bool(x) => x.to_sql(),
            Value::String(string) => string.to_sql(),
            Value::Bytes(bytes) => bytes.to_sql(),
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
