#![forbid(unsafe_code)]
use super::{batch_objects, exec_if_valid_objects, with_auto_commit_suspended, BatchHelper, MultiRowProcessor, ParameterExtractor};
use crate::{
    error::Result,
    mapping::{Operation, RowSource, TableMapping},
    storage::Connection,
};

////////////////////////////////////////////////////////////////////////////////

/// One single-row statement per object, queued on the driver batch and
/// flushed every `batch_size` objects.
#[derive(Clone, Copy, Debug)]
pub struct SimpleBatch {
    batch_size: usize,
}

impl SimpleBatch {
    pub fn new(batch_size: usize) -> Self {
        Self { batch_size }
    }

    fn write<T, R: RowSource<T>>(
        &self,
        mapping: &TableMapping<T>,
        conn: &dyn Connection,
        operation: Operation,
        mut rows: Vec<R>,
    ) -> Result<Vec<usize>> {
        with_auto_commit_suspended(conn, || {
            let mut stmt = mapping.prepare_multi_row(conn, operation, 1)?;
            let mut helper = BatchHelper::new(self.batch_size);
            let mut applied = 0;

            for index in 0..rows.len() {
                mapping.set_rows_parameters(stmt.as_mut(), &rows[index..=index])?;
                if helper.add(stmt.as_mut())? {
                    mapping.fetch_generated_keys(stmt.as_mut(), operation, &mut rows[applied..=index])?;
                    applied = index + 1;
                }
            }
            if helper.flush(stmt.as_mut())? {
                mapping.fetch_generated_keys(stmt.as_mut(), operation, &mut rows[applied..])?;
            }

            Ok(helper.into_results())
        })
    }
}

impl<T> MultiRowProcessor<T> for SimpleBatch {
    fn name(&self) -> &'static str {
        "SimpleBatch"
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn multi_row_insert(
        &self,
        mapping: &TableMapping<T>,
        conn: &dyn Connection,
        objects: Vec<Option<&mut T>>,
    ) -> Result<Vec<usize>> {
        exec_if_valid_objects(mapping, "SimpleBatch", objects, |rows| {
            self.write(mapping, conn, Operation::Insert, rows)
        })
    }

    fn multi_row_merge(
        &self,
        mapping: &TableMapping<T>,
        conn: &dyn Connection,
        objects: Vec<Option<&T>>,
    ) -> Result<Vec<usize>> {
        exec_if_valid_objects(mapping, "SimpleBatch", objects, |rows| {
            self.write(mapping, conn, Operation::Merge, rows)
        })
    }

    fn batch(
        &self,
        mapping: &TableMapping<T>,
        conn: &dyn Connection,
        sql: &str,
        parameters: ParameterExtractor<'_, T>,
        objects: Vec<Option<&T>>,
    ) -> Result<Vec<usize>> {
        batch_objects(mapping, conn, "SimpleBatch", self.batch_size, sql, parameters, objects)
    }
}
