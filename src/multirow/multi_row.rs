#![forbid(unsafe_code)]
use super::{batch_objects, exec_if_valid_objects, with_auto_commit_suspended, MultiRowProcessor, ParameterExtractor};
use crate::{
    error::Result,
    mapping::{Operation, RowSource, TableMapping},
    storage::Connection,
};

////////////////////////////////////////////////////////////////////////////////

/// Partitions the objects into `multi_row_size` chunks and writes each chunk
/// with one statement carrying that many value tuples.
///
/// The full-size statement is prepared once and reused; the last partition
/// always gets a statement of its own size.
#[derive(Clone, Copy, Debug)]
pub struct MultiRowInOneStatement {
    batch_size: usize,
    multi_row_size: usize,
}

impl MultiRowInOneStatement {
    pub fn new(batch_size: usize, multi_row_size: usize) -> Self {
        Self {
            batch_size,
            multi_row_size: multi_row_size.max(1),
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
            let mut partitions = rows.chunks_mut(self.multi_row_size);
            let count = partitions.len();
            let mut result = Vec::with_capacity(count);

            if count > 1 {
                let mut stmt = mapping.prepare_multi_row(conn, operation, self.multi_row_size)?;
                for partition in partitions.by_ref().take(count - 1) {
                    result.push(mapping.execute_partition(stmt.as_mut(), operation, partition)?);
                }
            }

            if let Some(last) = partitions.next() {
                let mut stmt = mapping.prepare_multi_row(conn, operation, last.len())?;
                result.push(mapping.execute_partition(stmt.as_mut(), operation, last)?);
            }

            Ok(result)
        })
    }
}

impl<T> MultiRowProcessor<T> for MultiRowInOneStatement {
    fn name(&self) -> &'static str {
        "MultiRowInOneStatement"
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
        exec_if_valid_objects(mapping, "MultiRowInOneStatement", objects, |rows| {
            self.write(mapping, conn, Operation::Insert, rows)
        })
    }

    fn multi_row_merge(
        &self,
        mapping: &TableMapping<T>,
        conn: &dyn Connection,
        objects: Vec<Option<&T>>,
    ) -> Result<Vec<usize>> {
        exec_if_valid_objects(mapping, "MultiRowInOneStatement", objects, |rows| {
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
        batch_objects(mapping, conn, "MultiRowInOneStatement", self.batch_size, sql, parameters, objects)
    }
}
