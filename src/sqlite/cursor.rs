use std::collections::VecDeque;

use rusqlite::types::Value;
use rusqlite::{Batch, Connection};
use tracing::trace;

use crate::cursor::ResultCursor;
use crate::error::SqlMultisetError;
use crate::types::RowValues;

/// Extract a `RowValues` from a `SQLite` row.
///
/// # Errors
///
/// Returns `SqlMultisetError` if the value cannot be read.
pub fn sqlite_extract_value(row: &rusqlite::Row, idx: usize) -> Result<RowValues, SqlMultisetError> {
    let value: Value = row.get(idx)?;
    Ok(match value {
        Value::Null => RowValues::Null,
        Value::Integer(i) => RowValues::Int(i),
        Value::Real(f) => RowValues::Float(f),
        Value::Text(s) => RowValues::Text(s),
        Value::Blob(b) => RowValues::Blob(b),
    })
}

/// Walks the statements of one batch, stopping on each statement that returns columns.
///
/// Statements without result columns (DDL, DML) run as they are passed and do not count as
/// result sets. Rows of the current statement are buffered when it is positioned, since a
/// `rusqlite::Rows` cannot outlive the statement it borrows.
pub(crate) struct BatchWalker<'conn, 'sql> {
    batch: Batch<'conn, 'sql>,
    columns: Vec<String>,
    rows: VecDeque<Vec<RowValues>>,
    has_current: bool,
}

impl<'conn, 'sql> BatchWalker<'conn, 'sql> {
    pub(crate) fn start(conn: &'conn Connection, sql: &'sql str) -> Result<Self, SqlMultisetError> {
        let mut walker = Self {
            batch: Batch::new(conn, sql),
            columns: Vec::new(),
            rows: VecDeque::new(),
            has_current: false,
        };
        walker.advance()?;
        Ok(walker)
    }

    pub(crate) fn has_current(&self) -> bool {
        self.has_current
    }

    pub(crate) fn columns(&self) -> &[String] {
        &self.columns
    }

    pub(crate) fn next_row(&mut self) -> Option<Vec<RowValues>> {
        self.rows.pop_front()
    }

    /// Up to `max` buffered rows of the current result set.
    pub(crate) fn take_rows(&mut self, max: usize) -> Vec<Vec<RowValues>> {
        let n = max.min(self.rows.len());
        self.rows.drain(..n).collect()
    }

    pub(crate) fn advance(&mut self) -> Result<bool, SqlMultisetError> {
        self.columns.clear();
        self.rows.clear();
        self.has_current = false;

        while let Some(mut stmt) = self.batch.next()? {
            if stmt.column_count() == 0 {
                stmt.execute([])?;
                continue;
            }
            self.columns = stmt
                .column_names()
                .into_iter()
                .map(str::to_owned)
                .collect();
            let col_count = self.columns.len();
            let mut rows = stmt.query([])?;
            while let Some(row) = rows.next()? {
                let mut values = Vec::with_capacity(col_count);
                for idx in 0..col_count {
                    values.push(sqlite_extract_value(row, idx)?);
                }
                self.rows.push_back(values);
            }
            trace!(columns = col_count, rows = self.rows.len(), "positioned on sqlite result set");
            self.has_current = true;
            return Ok(true);
        }
        Ok(false)
    }
}

/// Blocking cursor over a `SQLite` batch.
///
/// The cursor holds the primary connection's exclusive borrow until it is dropped, so nothing
/// else can run on that connection while result sets remain.
pub struct SqliteCursor<'conn> {
    walker: Option<BatchWalker<'conn, 'conn>>,
}

impl<'conn> SqliteCursor<'conn> {
    /// Execute `batch` on `conn`, positioning on the first result set.
    ///
    /// # Errors
    /// Returns `SqlMultisetError::SqliteError` if a statement before the first result set
    /// fails to prepare or run.
    pub fn execute(conn: &'conn mut Connection, batch: &'conn str) -> Result<Self, SqlMultisetError> {
        let conn: &'conn Connection = conn;
        Ok(Self {
            walker: Some(BatchWalker::start(conn, batch)?),
        })
    }
}

impl ResultCursor for SqliteCursor<'_> {
    fn has_current(&self) -> bool {
        self.walker.as_ref().is_some_and(BatchWalker::has_current)
    }

    fn columns(&self) -> &[String] {
        match &self.walker {
            Some(walker) => walker.columns(),
            None => &[],
        }
    }

    fn read_row(&mut self) -> Result<Option<Vec<RowValues>>, SqlMultisetError> {
        Ok(self.walker.as_mut().and_then(BatchWalker::next_row))
    }

    fn next_result(&mut self) -> Result<bool, SqlMultisetError> {
        match self.walker.as_mut() {
            Some(walker) => walker.advance(),
            None => Ok(false),
        }
    }

    fn close(&mut self) -> Result<(), SqlMultisetError> {
        self.walker = None;
        Ok(())
    }
}
