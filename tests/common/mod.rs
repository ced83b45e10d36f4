#![forbid(unsafe_code)]
#![allow(dead_code)]
use rowmap::{
    Connection, Error, GeneratedKeys, Result, RowCursor, RowShape, Statement, TableMetadata, Value,
};
use std::{cell::RefCell, collections::HashMap};

////////////////////////////////////////////////////////////////////////////////

/// Everything a [`MockConnection`] observed.
#[derive(Debug, Default)]
pub struct Journal {
    pub auto_commit: bool,
    pub prepared: Vec<String>,
    /// Rows written by each execution, in order.
    pub executions: Vec<usize>,
    pub commits: usize,
    pub rollbacks: usize,
    /// Executions before the one that fails.
    pub fail_after: Option<usize>,
    pub fail_restore: bool,
    next_key: i64,
}

/// Records statements and transaction calls without a database. An
/// execution writes one row per `(?` tuple in its SQL.
pub struct MockConnection {
    tables: HashMap<String, TableMetadata>,
    journal: RefCell<Journal>,
}

impl MockConnection {
    pub fn new(tables: impl IntoIterator<Item = TableMetadata>) -> Self {
        Self {
            tables: tables
                .into_iter()
                .map(|table| (table.name.to_lowercase(), table))
                .collect(),
            journal: RefCell::new(Journal {
                auto_commit: true,
                ..Default::default()
            }),
        }
    }

    pub fn journal(&self) -> std::cell::Ref<'_, Journal> {
        self.journal.borrow()
    }

    pub fn journal_mut(&self) -> std::cell::RefMut<'_, Journal> {
        self.journal.borrow_mut()
    }

    /// Forgets everything recorded so far, keeping the auto-commit flag.
    pub fn clear(&self) {
        let mut journal = self.journal.borrow_mut();
        journal.prepared.clear();
        journal.executions.clear();
        journal.commits = 0;
        journal.rollbacks = 0;
    }

    fn statement(&self, sql: &str, returning: Option<&[String]>) -> Box<dyn Statement + '_> {
        self.journal.borrow_mut().prepared.push(sql.to_string());
        Box::new(MockStatement {
            conn: self,
            rows: sql.matches("(?").count().max(1),
            parameters: Vec::new(),
            queued: 0,
            returning: returning.map(<[String]>::to_vec),
            keys: Vec::new(),
        })
    }
}

impl Connection for MockConnection {
    fn prepare(&self, sql: &str) -> Result<Box<dyn Statement + '_>> {
        Ok(self.statement(sql, None))
    }

    fn prepare_with_generated_keys(
        &self,
        sql: &str,
        key_columns: &[String],
    ) -> Result<Box<dyn Statement + '_>> {
        Ok(self.statement(sql, Some(key_columns)))
    }

    fn auto_commit(&self) -> Result<bool> {
        Ok(self.journal.borrow().auto_commit)
    }

    fn set_auto_commit(&self, auto_commit: bool) -> Result<()> {
        let mut journal = self.journal.borrow_mut();
        if auto_commit && journal.fail_restore {
            return Err(Error::Storage("cannot restore auto-commit".into()));
        }
        journal.auto_commit = auto_commit;
        Ok(())
    }

    fn commit(&self) -> Result<()> {
        self.journal.borrow_mut().commits += 1;
        Ok(())
    }

    fn rollback(&self) -> Result<()> {
        self.journal.borrow_mut().rollbacks += 1;
        Ok(())
    }

    fn table_metadata(&self, table: &str) -> Result<Option<TableMetadata>> {
        Ok(self.tables.get(&table.to_lowercase()).cloned())
    }
}

////////////////////////////////////////////////////////////////////////////////

struct MockStatement<'c> {
    conn: &'c MockConnection,
    rows: usize,
    parameters: Vec<Value>,
    queued: usize,
    returning: Option<Vec<String>>,
    keys: Vec<Vec<Value>>,
}

impl MockStatement<'_> {
    fn execute(&mut self) -> Result<usize> {
        let mut journal = self.conn.journal.borrow_mut();
        if journal.fail_after == Some(journal.executions.len()) {
            return Err(Error::Storage("injected failure".into()));
        }
        journal.executions.push(self.rows);
        if self.returning.is_some() {
            for _ in 0..self.rows {
                journal.next_key += 1;
                self.keys.push(vec![Value::Int64(journal.next_key)]);
            }
        }
        Ok(self.rows)
    }
}

impl Statement for MockStatement<'_> {
    fn set_parameters(&mut self, parameters: &[Value]) -> Result<()> {
        self.parameters = parameters.to_vec();
        Ok(())
    }

    fn execute_update(&mut self) -> Result<usize> {
        self.execute()
    }

    fn add_batch(&mut self) -> Result<()> {
        self.queued += 1;
        Ok(())
    }

    fn execute_batch(&mut self) -> Result<Vec<usize>> {
        let queued = std::mem::take(&mut self.queued);
        (0..queued).map(|_| self.execute()).collect()
    }

    fn query(&mut self) -> Result<Box<dyn RowCursor + '_>> {
        Ok(Box::new(EmptyCursor(RowShape::default())))
    }

    fn generated_keys(&mut self) -> Result<GeneratedKeys> {
        let shape = RowShape::new(self.returning.clone().unwrap_or_default());
        Ok(GeneratedKeys {
            shape,
            rows: std::mem::take(&mut self.keys),
        })
    }
}

struct EmptyCursor(RowShape);

impl RowCursor for EmptyCursor {
    fn shape(&self) -> &RowShape {
        &self.0
    }

    fn next_row(&mut self) -> Result<Option<Vec<Value>>> {
        Ok(None)
    }
}
