use std::fmt;
use std::pin::Pin;

use async_trait::async_trait;
use futures_util::future::ready;
use futures_util::stream::{Stream, StreamExt};
use tokio_postgres::{Client, SimpleQueryMessage, SimpleQueryRow};
use tracing::{debug, trace};

use crate::cursor::AsyncResultCursor;
use crate::error::SqlMultisetError;
use crate::types::RowValues;

/// The parts of the simple-query protocol the cursor acts on.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum BatchMessage {
    Columns(Vec<String>),
    Row(Vec<RowValues>),
    Complete,
}

pub(crate) type MessageStream =
    Pin<Box<dyn Stream<Item = Result<BatchMessage, SqlMultisetError>> + Send>>;

/// Async cursor over the result sets of a Postgres simple-query batch.
///
/// Messages are pulled from the server as the cursor moves, so a statement that fails later
/// in the batch surfaces when the cursor reaches it. The simple-query protocol returns every
/// value as text; typed extraction relies on column descriptors and
/// [`FromRowValue`](crate::types::FromRowValue) to parse them. Statements that return no row
/// description (DDL, DML) do not produce result sets.
pub struct PostgresCursor {
    stream: Option<MessageStream>,
    columns: Vec<String>,
    has_current: bool,
    set_done: bool,
    // Row description that arrived while the previous set was still being read.
    next_columns: Option<Vec<String>>,
}

impl PostgresCursor {
    /// Start `batch` through the simple-query protocol and position on its first result set.
    ///
    /// # Errors
    /// Returns `SqlMultisetError::PostgresError` if the batch cannot be sent or a statement
    /// before the first result set fails.
    pub async fn execute(client: &Client, batch: &str) -> Result<Self, SqlMultisetError> {
        let raw = client.simple_query_raw(batch).await?;
        let stream = raw.filter_map(|item| {
            ready(match item {
                Ok(message) => batch_message(message).map(Ok),
                Err(err) => Some(Err(SqlMultisetError::from(err))),
            })
        });
        Self::from_stream(Box::pin(stream)).await
    }

    pub(crate) async fn from_stream(stream: MessageStream) -> Result<Self, SqlMultisetError> {
        let mut cursor = Self {
            stream: Some(stream),
            columns: Vec::new(),
            has_current: false,
            set_done: true,
            next_columns: None,
        };
        cursor.position().await?;
        Ok(cursor)
    }

    async fn pull(&mut self) -> Result<Option<BatchMessage>, SqlMultisetError> {
        let Some(stream) = self.stream.as_mut() else {
            return Ok(None);
        };
        match stream.next().await {
            Some(Ok(message)) => Ok(Some(message)),
            Some(Err(err)) => {
                self.stream = None;
                Err(err)
            }
            None => {
                self.stream = None;
                Ok(None)
            }
        }
    }

    /// Move to the next row description, skipping completions of statements without rows.
    async fn position(&mut self) -> Result<bool, SqlMultisetError> {
        self.columns.clear();
        self.has_current = false;
        self.set_done = true;
        let columns = match self.next_columns.take() {
            Some(columns) => Some(columns),
            None => loop {
                match self.pull().await? {
                    Some(BatchMessage::Columns(columns)) => break Some(columns),
                    Some(BatchMessage::Row(_) | BatchMessage::Complete) => {}
                    None => break None,
                }
            },
        };
        if let Some(columns) = columns {
            trace!(columns = columns.len(), "positioned on postgres result set");
            self.columns = columns;
            self.has_current = true;
            self.set_done = false;
        }
        Ok(self.has_current)
    }
}

fn batch_message(message: SimpleQueryMessage) -> Option<BatchMessage> {
    match message {
        SimpleQueryMessage::RowDescription(columns) => Some(BatchMessage::Columns(
            columns.iter().map(|c| c.name().to_owned()).collect(),
        )),
        SimpleQueryMessage::Row(row) => Some(BatchMessage::Row(row_values(&row))),
        SimpleQueryMessage::CommandComplete(_) => Some(BatchMessage::Complete),
        _ => None,
    }
}

fn row_values(row: &SimpleQueryRow) -> Vec<RowValues> {
    (0..row.len())
        .map(|idx| match row.get(idx) {
            Some(text) => RowValues::Text(text.to_owned()),
            None => RowValues::Null,
        })
        .collect()
}

impl fmt::Debug for PostgresCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostgresCursor")
            .field("columns", &self.columns)
            .field("has_current", &self.has_current)
            .field("set_done", &self.set_done)
            .field("closed", &self.stream.is_none())
            .finish()
    }
}

#[async_trait]
impl AsyncResultCursor for PostgresCursor {
    fn has_current(&self) -> bool {
        self.has_current
    }

    fn columns(&self) -> &[String] {
        &self.columns
    }

    async fn read_row(&mut self) -> Result<Option<Vec<RowValues>>, SqlMultisetError> {
        if !self.has_current || self.set_done {
            return Ok(None);
        }
        match self.pull().await? {
            Some(BatchMessage::Row(values)) => Ok(Some(values)),
            Some(BatchMessage::Columns(columns)) => {
                self.next_columns = Some(columns);
                self.set_done = true;
                Ok(None)
            }
            Some(BatchMessage::Complete) | None => {
                self.set_done = true;
                Ok(None)
            }
        }
    }

    async fn next_result(&mut self) -> Result<bool, SqlMultisetError> {
        if !self.has_current {
            return Ok(false);
        }
        while self.read_row().await?.is_some() {}
        self.position().await
    }

    async fn close(&mut self) -> Result<(), SqlMultisetError> {
        if self.stream.take().is_some() {
            debug!("closed postgres batch cursor");
        }
        self.columns.clear();
        self.has_current = false;
        self.set_done = true;
        self.next_columns = None;
        Ok(())
    }
}
