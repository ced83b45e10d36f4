#![forbid(unsafe_code)]
use super::{
    batch_objects, exec_if_valid_objects, with_auto_commit_suspended, BatchHelper, MultiRowProcessor,
    ParameterExtractor,
};
use crate::{
    error::Result,
    mapping::{Operation, RowSource, TableMapping},
    storage::Connection,
};

////////////////////////////////////////////////////////////////////////////////

/// Multi-row statements for the full partitions, queued on the driver batch
/// and flushed every `batch_size_with_multi_row` partitions. The last
/// partition is executed on its own, outside the batch.
#[derive(Clone, Copy, Debug)]
pub struct BatchOfMultiRowInOneStatement {
    batch_size: usize,
    multi_row_size: usize,
    batch_size_with_multi_row: usize,
}

impl BatchOfMultiRowInOneStatement {
    pub fn new(batch_size: usize, multi_row_size: usize, batch_size_with_multi_row: usize) -> Self {
        Self {
            batch_size,
            multi_row_size: multi_row_size.max(1),
            batch_size_with_multi_row,
        }
    }

    fn write<T, R: RowSource<T>>(
        &self,
        mapping: &TableMapping<T>,
        conn: &dyn Connection,
        operation: Operation,
        mut rows: Vec<R>,
    ) -> Result<Vec<usize>> {
        with_auto_commit_suspended(conn, || {
            let size = self.multi_row_size;
            let count = (rows.len() + size - 1) / size;
            let mut result = Vec::with_capacity(count);
            let (full, last) = rows.split_at_mut((count - 1) * size);

            if !full.is_empty() {
                let mut stmt = mapping.prepare_multi_row(conn, operation, size)?;
                let mut helper = BatchHelper::new(self.batch_size_with_multi_row);
                let mut applied = 0;

                for end in (size..=full.len()).step_by(size) {
                    mapping.set_rows_parameters(stmt.as_mut(), &full[end - size..end])?;
                    if helper.add(stmt.as_mut())? {
                        mapping.fetch_generated_keys(stmt.as_mut(), operation, &mut full[applied..end])?;
                        applied = end;
                    }
                }
                if helper.flush(stmt.as_mut())? {
                    mapping.fetch_generated_keys(stmt.as_mut(), operation, &mut full[applied..])?;
                }
                result.extend(helper.into_results());
            }

            let mut stmt = mapping.prepare_multi_row(conn, operation, last.len())?;
            result.push(mapping.execute_partition(stmt.as_mut(), operation, last)?);
            Ok(result)
        })
    }
}

impl<T> MultiRowProcessor<T> for BatchOfMultiRowInOneStatement {
    fn name(&self) -> &'static str {
        "BatchOfMultiRowInOneStatement"
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
        exec_if_valid_objects(mapping, "BatchOfMultiRowInOneStatement", objects, |rows| {
            self.write(mapping, conn, Operation::Insert, rows)
        })
    }

    fn multi_row_merge(
        &self,
        mapping: &TableMapping<T>,
        conn: &dyn Connection,
        objects: Vec<Option<&T>>,
    ) -> Result<Vec<usize>> {
        exec_if_valid_objects(mapping, "BatchOfMultiRowInOneStatement", objects, |rows| {
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
        batch_objects(
            mapping,
            conn,
            "BatchOfMultiRowInOneStatement",
            self.batch_size,
            sql,
            parameters,
            objects,
        )
    }
}
