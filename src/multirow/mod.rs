#![forbid(unsafe_code)]
//! Bulk write strategies.
//!
//! Every strategy drops absent objects first, returns an empty result for an
//! empty input without touching the connection, and runs with auto-commit
//! suspended. The transaction is committed or rolled back only when
//! auto-commit was on before the call; the original flag is always restored.

mod batch_of_multi_row;
mod multi_row;
mod simple_batch;

pub use batch_of_multi_row::BatchOfMultiRowInOneStatement;
pub use multi_row::MultiRowInOneStatement;
pub use simple_batch::SimpleBatch;

use crate::{
    data::Value,
    error::Result,
    mapping::TableMapping,
    storage::{Connection, Statement},
};
use tracing::{debug, trace, warn};

////////////////////////////////////////////////////////////////////////////////

/// Extracts the parameters of one statement execution from an object.
pub type ParameterExtractor<'a, T> = &'a dyn Fn(&T) -> Result<Vec<Value>>;

/// A bulk write strategy bound to one table binding.
///
/// The returned vector holds one update count per statement execution: one
/// per object for [`SimpleBatch`], one per partition for the multi-row
/// strategies.
pub trait MultiRowProcessor<T>: Send + Sync {
    fn name(&self) -> &'static str;

    /// Executions queued on the driver batch before a flush.
    fn batch_size(&self) -> usize;

    /// Inserts the present objects and writes generated keys back onto them.
    fn multi_row_insert(
        &self,
        mapping: &TableMapping<T>,
        conn: &dyn Connection,
        objects: Vec<Option<&mut T>>,
    ) -> Result<Vec<usize>>;

    fn multi_row_merge(
        &self,
        mapping: &TableMapping<T>,
        conn: &dyn Connection,
        objects: Vec<Option<&T>>,
    ) -> Result<Vec<usize>>;

    /// Executes `sql` once per present object through the driver batch.
    fn batch(
        &self,
        mapping: &TableMapping<T>,
        conn: &dyn Connection,
        sql: &str,
        parameters: ParameterExtractor<'_, T>,
        objects: Vec<Option<&T>>,
    ) -> Result<Vec<usize>>;
}

////////////////////////////////////////////////////////////////////////////////

/// Drops absent objects and runs `exec` on the rest, logging a summary.
pub(crate) fn exec_if_valid_objects<T, O>(
    mapping: &TableMapping<T>,
    strategy: &'static str,
    objects: Vec<Option<O>>,
    exec: impl FnOnce(Vec<O>) -> Result<Vec<usize>>,
) -> Result<Vec<usize>> {
    let requested = objects.len();
    let objects = objects.into_iter().flatten().collect::<Vec<_>>();
    if objects.is_empty() {
        return Ok(Vec::new());
    }

    let present = objects.len();
    let result = exec(objects)?;
    debug!(
        rows = result.iter().sum::<usize>(),
        objects = present,
        requested,
        type_name = mapping.type_name(),
        table = mapping.table_name(),
        strategy,
        "multi-row write finished"
    );
    Ok(result)
}

/// Runs `write` with auto-commit off, committing or rolling back only when
/// auto-commit was on before the call.
///
/// Failures of the rollback or the restore while another error is already
/// propagating are logged and the original error is returned.
pub(crate) fn with_auto_commit_suspended<R>(
    conn: &dyn Connection,
    write: impl FnOnce() -> Result<R>,
) -> Result<R> {
    let original = conn.auto_commit()?;
    conn.set_auto_commit(false)?;

    let result = write().and_then(|value| {
        if original {
            conn.commit()?;
        }
        Ok(value)
    });

    let result = match result {
        Err(err) if original => {
            if let Err(rollback) = conn.rollback() {
                warn!(error = %rollback, "rollback failed after write error");
            }
            Err(err)
        }
        other => other,
    };

    match (result, conn.set_auto_commit(original)) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(restore)) => Err(restore),
        (Err(err), Ok(())) => Err(err),
        (Err(err), Err(restore)) => {
            warn!(error = %restore, "failed to restore auto-commit after write error");
            Err(err)
        }
    }
}

/// `batch` shared by all strategies.
pub(crate) fn batch_objects<T>(
    mapping: &TableMapping<T>,
    conn: &dyn Connection,
    strategy: &'static str,
    batch_size: usize,
    sql: &str,
    parameters: ParameterExtractor<'_, T>,
    objects: Vec<Option<&T>>,
) -> Result<Vec<usize>> {
    exec_if_valid_objects(mapping, strategy, objects, |objects| {
        with_auto_commit_suspended(conn, || {
            trace!(sql, objects = objects.len(), "batch");
            let mut stmt = conn.prepare(sql)?;
            let mut helper = BatchHelper::new(batch_size);
            for object in objects {
                stmt.set_parameters(&parameters(object)?)?;
                helper.add(stmt.as_mut())?;
            }
            helper.flush(stmt.as_mut())?;
            Ok(helper.into_results())
        })
    })
}

////////////////////////////////////////////////////////////////////////////////

/// Queues executions and flushes them every `batch_size` additions.
pub(crate) struct BatchHelper {
    batch_size: usize,
    queued: usize,
    results: Vec<usize>,
}

impl BatchHelper {
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
            queued: 0,
            results: Vec::new(),
        }
    }

    /// Returns `true` when this addition triggered a flush.
    pub fn add(&mut self, stmt: &mut dyn Statement) -> Result<bool> {
        stmt.add_batch()?;
        self.queued += 1;
        if self.queued == self.batch_size {
            self.flush(stmt)
        } else {
            Ok(false)
        }
    }

    /// Returns `true` when anything was queued.
    pub fn flush(&mut self, stmt: &mut dyn Statement) -> Result<bool> {
        if self.queued == 0 {
            return Ok(false);
        }
        let counts = stmt.execute_batch()?;
        trace!(executions = counts.len(), "flushed batch");
        self.results.extend(counts);
        self.queued = 0;
        Ok(true)
    }

    pub fn into_results(self) -> Vec<usize> {
        self.results
    }
}
