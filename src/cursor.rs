//! Forward-only, multi-result cursors.
//!
//! A cursor is produced by executing one batched command and spans every result set the batch
//! returns. It starts positioned on the first result set (if any). Only the cursor moves between
//! result sets; rows are read strictly from the current one.

use async_trait::async_trait;

use crate::error::SqlMultisetError;
use crate::types::RowValues;

/// Blocking multi-result cursor.
pub trait ResultCursor {
    /// Whether the cursor currently sits on a result set.
    fn has_current(&self) -> bool;

    /// Column names of the current result set, in result order.
    fn columns(&self) -> &[String];

    /// Read the next row of the current result set; `None` at the result-set boundary.
    ///
    /// # Errors
    /// Returns the provider error raised while stepping the row.
    fn read_row(&mut self) -> Result<Option<Vec<RowValues>>, SqlMultisetError>;

    /// Discard what is left of the current result set and move to the next one.
    /// Returns `false` once no result sets remain.
    ///
    /// # Errors
    /// Returns the provider error raised while positioning on the next statement.
    fn next_result(&mut self) -> Result<bool, SqlMultisetError>;

    /// Release the cursor's provider resources.
    ///
    /// # Errors
    /// Returns the provider error raised while finalizing.
    fn close(&mut self) -> Result<(), SqlMultisetError>;
}

/// Suspending counterpart of [`ResultCursor`].
#[async_trait]
pub trait AsyncResultCursor: Send {
    fn has_current(&self) -> bool;

    fn columns(&self) -> &[String];

    /// # Errors
    /// Returns the provider error raised while reading.
    async fn read_row(&mut self) -> Result<Option<Vec<RowValues>>, SqlMultisetError>;

    /// # Errors
    /// Returns the provider error raised while positioning on the next statement.
    async fn next_result(&mut self) -> Result<bool, SqlMultisetError>;

    /// # Errors
    /// Returns the provider error raised while finalizing.
    async fn close(&mut self) -> Result<(), SqlMultisetError>;
}

/// Rows of the current result set, drained in full.
#[derive(Debug, Clone, Default)]
pub(crate) struct DrainedResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<RowValues>>,
}

pub(crate) fn drain_current<C: ResultCursor + ?Sized>(
    cursor: &mut C,
) -> Result<DrainedResultSet, SqlMultisetError> {
    let columns = cursor.columns().to_vec();
    let mut rows = Vec::new();
    while let Some(row) = cursor.read_row()? {
        rows.push(row);
    }
    Ok(DrainedResultSet { columns, rows })
}

pub(crate) async fn drain_current_async<C: AsyncResultCursor + ?Sized>(
    cursor: &mut C,
) -> Result<DrainedResultSet, SqlMultisetError> {
    let columns = cursor.columns().to_vec();
    let mut rows = Vec::new();
    while let Some(row) = cursor.read_row().await? {
        rows.push(row);
    }
    Ok(DrainedResultSet { columns, rows })
}
