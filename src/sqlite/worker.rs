use std::collections::VecDeque;
use std::fmt;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;

use async_trait::async_trait;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use super::config::SharedSqliteConnection;
use super::cursor::BatchWalker;
use crate::cursor::AsyncResultCursor;
use crate::error::SqlMultisetError;
use crate::types::RowValues;

const FETCH_CHUNK: usize = 256;

type Reply<T> = oneshot::Sender<Result<T, SqlMultisetError>>;

enum Command {
    Fetch {
        max: usize,
        respond_to: Reply<Vec<Vec<RowValues>>>,
    },
    NextResult {
        respond_to: Reply<Option<Vec<String>>>,
    },
    Close {
        respond_to: oneshot::Sender<()>,
    },
}

/// Async cursor over a `SQLite` batch, driven by a dedicated worker thread.
///
/// The worker locks the shared primary connection for the cursor's whole life and walks the
/// batch there; this handle only exchanges commands with it, so no `SQLite` call runs on the
/// async runtime. Dropping the handle stops the worker and releases the connection.
pub struct AsyncSqliteCursor {
    sender: Option<Sender<Command>>,
    columns: Vec<String>,
    buffered: VecDeque<Vec<RowValues>>,
    fetched_all: bool,
    has_current: bool,
}

impl AsyncSqliteCursor {
    /// Spawn the worker, run `batch` up to its first result set and return the cursor.
    ///
    /// # Errors
    /// Returns `SqlMultisetError::Connection` if the worker thread cannot start, or the error
    /// raised while running the batch up to its first result set.
    pub async fn execute(
        conn: SharedSqliteConnection,
        batch: impl Into<String>,
    ) -> Result<Self, SqlMultisetError> {
        let batch = batch.into();
        let (sender, receiver) = mpsc::channel::<Command>();
        let (ready_tx, ready_rx) = oneshot::channel();
        thread::Builder::new()
            .name("sqlite-batch-cursor".into())
            .spawn(move || run_cursor_worker(&conn, &batch, ready_tx, &receiver))
            .map_err(|err| {
                SqlMultisetError::Connection(format!("failed to spawn SQLite cursor worker: {err}"))
            })?;

        let first = ready_rx.await.map_err(|_| {
            SqlMultisetError::Connection("SQLite cursor worker exited before positioning".into())
        })??;
        let mut cursor = Self {
            sender: Some(sender),
            columns: Vec::new(),
            buffered: VecDeque::new(),
            fetched_all: false,
            has_current: false,
        };
        cursor.position(first);
        Ok(cursor)
    }

    fn position(&mut self, columns: Option<Vec<String>>) {
        self.buffered.clear();
        match columns {
            Some(columns) => {
                self.columns = columns;
                self.has_current = true;
                self.fetched_all = false;
            }
            None => {
                self.columns.clear();
                self.has_current = false;
                self.fetched_all = true;
            }
        }
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(Reply<T>) -> Command,
        what: &str,
    ) -> Result<T, SqlMultisetError> {
        let sender = self.sender.as_ref().ok_or_else(|| {
            SqlMultisetError::CursorState(format!("SQLite cursor closed before {what}"))
        })?;
        let (tx, rx) = oneshot::channel();
        sender
            .send(build(tx))
            .map_err(|_| SqlMultisetError::Connection("SQLite cursor worker closed".into()))?;
        rx.await.map_err(|_| {
            SqlMultisetError::Connection(format!("SQLite cursor worker dropped during {what}"))
        })?
    }
}

impl fmt::Debug for AsyncSqliteCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncSqliteCursor")
            .field("columns", &self.columns)
            .field("buffered", &self.buffered.len())
            .field("has_current", &self.has_current)
            .field("closed", &self.sender.is_none())
            .finish()
    }
}

#[async_trait]
impl AsyncResultCursor for AsyncSqliteCursor {
    fn has_current(&self) -> bool {
        self.has_current
    }

    fn columns(&self) -> &[String] {
        &self.columns
    }

    async fn read_row(&mut self) -> Result<Option<Vec<RowValues>>, SqlMultisetError> {
        if self.buffered.is_empty() && !self.fetched_all {
            let chunk = self
                .request(|respond_to| Command::Fetch { max: FETCH_CHUNK, respond_to }, "fetch")
                .await?;
            self.fetched_all = chunk.len() < FETCH_CHUNK;
            self.buffered.extend(chunk);
        }
        Ok(self.buffered.pop_front())
    }

    async fn next_result(&mut self) -> Result<bool, SqlMultisetError> {
        if !self.has_current {
            return Ok(false);
        }
        let columns = self
            .request(|respond_to| Command::NextResult { respond_to }, "next_result")
            .await?;
        self.position(columns);
        Ok(self.has_current)
    }

    async fn close(&mut self) -> Result<(), SqlMultisetError> {
        let Some(sender) = self.sender.take() else {
            return Ok(());
        };
        self.position(None);
        let (tx, rx) = oneshot::channel();
        if sender.send(Command::Close { respond_to: tx }).is_ok() {
            // The worker releases the connection before replying.
            let _ = rx.await;
        }
        debug!("closed SQLite batch cursor");
        Ok(())
    }
}

fn run_cursor_worker(
    conn: &SharedSqliteConnection,
    batch: &str,
    ready: Reply<Option<Vec<String>>>,
    receiver: &Receiver<Command>,
) {
    let guard = conn.blocking_lock();
    let mut walker = match BatchWalker::start(&guard, batch) {
        Ok(walker) => walker,
        Err(err) => {
            let _ = ready.send(Err(err));
            return;
        }
    };
    let _ = ready.send(Ok(current_columns(&walker)));

    while let Ok(command) = receiver.recv() {
        match command {
            Command::Fetch { max, respond_to } => {
                let _ = respond_to.send(Ok(walker.take_rows(max)));
            }
            Command::NextResult { respond_to } => {
                let outcome = walker.advance().map(|_| current_columns(&walker));
                if let Err(err) = &outcome {
                    warn!(error = %err, "SQLite batch failed while advancing");
                }
                let _ = respond_to.send(outcome);
            }
            Command::Close { respond_to } => {
                drop(walker);
                drop(guard);
                let _ = respond_to.send(());
                return;
            }
        }
    }
}

fn current_columns(walker: &BatchWalker<'_, '_>) -> Option<Vec<String>> {
    walker.has_current().then(|| walker.columns().to_vec())
}
