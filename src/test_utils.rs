//! In-memory cursor and schema provider for exercising extractors without a database.

use std::any::TypeId;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::cursor::{AsyncResultCursor, ResultCursor};
use crate::error::SqlMultisetError;
use crate::metadata::ColumnDescriptor;
use crate::provider::{AsyncSchemaProvider, SchemaProvider};
use crate::types::{RowValues, TransactionContext};

/// One canned result set.
#[derive(Debug, Clone, Default)]
pub struct MemoryResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<RowValues>>,
}

impl MemoryResultSet {
    #[must_use]
    pub fn new(columns: &[&str], rows: Vec<Vec<RowValues>>) -> Self {
        Self {
            columns: columns.iter().map(ToString::to_string).collect(),
            rows,
        }
    }

    /// Single-column, single-row result set.
    #[must_use]
    pub fn scalar(column: &str, value: RowValues) -> Self {
        Self::new(&[column], vec![vec![value]])
    }
}

/// Cursor over canned result sets. Counts `close` calls and can fail the next read.
#[derive(Debug)]
pub struct MemoryCursor {
    sets: VecDeque<MemoryResultSet>,
    current: Option<MemoryResultSet>,
    row: usize,
    closes: Arc<AtomicUsize>,
    fail_read: Arc<AtomicBool>,
}

impl MemoryCursor {
    #[must_use]
    pub fn new(sets: Vec<MemoryResultSet>) -> Self {
        let mut sets: VecDeque<_> = sets.into();
        let current = sets.pop_front();
        Self {
            sets,
            current,
            row: 0,
            closes: Arc::new(AtomicUsize::new(0)),
            fail_read: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Shared counter of `close` calls; stays readable after the cursor moves into an extractor.
    #[must_use]
    pub fn close_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.closes)
    }

    /// Switch that makes the next `read_row` fail.
    #[must_use]
    pub fn read_failure_switch(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.fail_read)
    }

    fn read(&mut self) -> Result<Option<Vec<RowValues>>, SqlMultisetError> {
        if self.fail_read.swap(false, Ordering::SeqCst) {
            return Err(SqlMultisetError::Execution("injected read failure".into()));
        }
        let Some(set) = &self.current else {
            return Ok(None);
        };
        let row = set.rows.get(self.row).cloned();
        if row.is_some() {
            self.row += 1;
        }
        Ok(row)
    }

    fn advance(&mut self) -> bool {
        self.current = self.sets.pop_front();
        self.row = 0;
        self.current.is_some()
    }

    fn close_now(&mut self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.sets.clear();
        self.current = None;
    }
}

impl ResultCursor for MemoryCursor {
    fn has_current(&self) -> bool {
        self.current.is_some()
    }

    fn columns(&self) -> &[String] {
        match &self.current {
            Some(set) => &set.columns,
            None => &[],
        }
    }

    fn read_row(&mut self) -> Result<Option<Vec<RowValues>>, SqlMultisetError> {
        self.read()
    }

    fn next_result(&mut self) -> Result<bool, SqlMultisetError> {
        Ok(self.advance())
    }

    fn close(&mut self) -> Result<(), SqlMultisetError> {
        self.close_now();
        Ok(())
    }
}

#[async_trait]
impl AsyncResultCursor for MemoryCursor {
    fn has_current(&self) -> bool {
        self.current.is_some()
    }

    fn columns(&self) -> &[String] {
        match &self.current {
            Some(set) => &set.columns,
            None => &[],
        }
    }

    async fn read_row(&mut self) -> Result<Option<Vec<RowValues>>, SqlMultisetError> {
        tokio::task::yield_now().await;
        self.read()
    }

    async fn next_result(&mut self) -> Result<bool, SqlMultisetError> {
        tokio::task::yield_now().await;
        Ok(self.advance())
    }

    async fn close(&mut self) -> Result<(), SqlMultisetError> {
        self.close_now();
        Ok(())
    }
}

/// Marker type standing in for the connection implementation behind [`MemoryProvider`].
#[derive(Debug)]
pub struct MemoryConnection;

/// Side connection handed out by [`MemoryProvider`]; decrements the open count when dropped.
#[derive(Debug)]
pub struct MemorySideConnection {
    open: Arc<AtomicUsize>,
}

impl Drop for MemorySideConnection {
    fn drop(&mut self) {
        self.open.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Debug, Default)]
struct ProviderCounters {
    describes: AtomicUsize,
    open: Arc<AtomicUsize>,
    fail_open: AtomicBool,
    fail_describe: AtomicBool,
}

/// Schema provider backed by a table map. Counts discovery calls and currently open side
/// connections.
#[derive(Debug, Clone)]
pub struct MemoryProvider {
    connection_string: String,
    tables: HashMap<String, Vec<ColumnDescriptor>>,
    counters: Arc<ProviderCounters>,
}

impl MemoryProvider {
    #[must_use]
    pub fn new(connection_string: impl Into<String>) -> Self {
        Self {
            connection_string: connection_string.into(),
            tables: HashMap::new(),
            counters: Arc::new(ProviderCounters::default()),
        }
    }

    #[must_use]
    pub fn with_table(mut self, table: &str, columns: Vec<ColumnDescriptor>) -> Self {
        self.tables.insert(table.to_ascii_lowercase(), columns);
        self
    }

    /// Number of schema-discovery queries run so far.
    #[must_use]
    pub fn describe_calls(&self) -> usize {
        self.counters.describes.load(Ordering::SeqCst)
    }

    /// Side connections opened and not yet closed.
    #[must_use]
    pub fn open_side_connections(&self) -> usize {
        self.counters.open.load(Ordering::SeqCst)
    }

    pub fn fail_next_open(&self) {
        self.counters.fail_open.store(true, Ordering::SeqCst);
    }

    pub fn fail_next_describe(&self) {
        self.counters.fail_describe.store(true, Ordering::SeqCst);
    }

    fn open(&self) -> Result<MemorySideConnection, SqlMultisetError> {
        if self.counters.fail_open.swap(false, Ordering::SeqCst) {
            return Err(SqlMultisetError::Connection("injected open failure".into()));
        }
        self.counters.open.fetch_add(1, Ordering::SeqCst);
        Ok(MemorySideConnection {
            open: Arc::clone(&self.counters.open),
        })
    }

    fn describe(&self, table: &str) -> Result<Vec<ColumnDescriptor>, SqlMultisetError> {
        self.counters.describes.fetch_add(1, Ordering::SeqCst);
        if self.counters.fail_describe.swap(false, Ordering::SeqCst) {
            return Err(SqlMultisetError::Metadata("injected describe failure".into()));
        }
        Ok(self
            .tables
            .get(&table.to_ascii_lowercase())
            .cloned()
            .unwrap_or_default())
    }
}

impl SchemaProvider for MemoryProvider {
    type SideConnection = MemorySideConnection;

    fn connection_type(&self) -> TypeId {
        TypeId::of::<MemoryConnection>()
    }

    fn connection_string(&self) -> Option<&str> {
        Some(&self.connection_string)
    }

    fn open_side_connection(&self) -> Result<Self::SideConnection, SqlMultisetError> {
        self.open()
    }

    fn describe_columns(
        &self,
        _side: &mut Self::SideConnection,
        table: &str,
        _transaction: Option<&TransactionContext>,
    ) -> Result<Vec<ColumnDescriptor>, SqlMultisetError> {
        self.describe(table)
    }
}

#[async_trait]
impl AsyncSchemaProvider for MemoryProvider {
    type SideConnection = MemorySideConnection;

    fn connection_type(&self) -> TypeId {
        TypeId::of::<MemoryConnection>()
    }

    fn connection_string(&self) -> Option<&str> {
        Some(&self.connection_string)
    }

    async fn open_side_connection(&self) -> Result<Self::SideConnection, SqlMultisetError> {
        tokio::task::yield_now().await;
        self.open()
    }

    async fn describe_columns(
        &self,
        _side: &mut Self::SideConnection,
        table: &str,
        _transaction: Option<&TransactionContext>,
    ) -> Result<Vec<ColumnDescriptor>, SqlMultisetError> {
        tokio::task::yield_now().await;
        self.describe(table)
    }
}
