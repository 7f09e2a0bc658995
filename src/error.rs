use thiserror::Error;

#[cfg(feature = "sqlite")]
use rusqlite;
#[cfg(feature = "postgres")]
use tokio_postgres;

#[derive(Debug, Error)]
pub enum SqlMultisetError {
    #[cfg(feature = "postgres")]
    #[error(transparent)]
    PostgresError(#[from] tokio_postgres::Error),

    #[cfg(feature = "sqlite")]
    #[error(transparent)]
    SqliteError(#[from] rusqlite::Error),

    /// The extractor is not positioned on a readable result set.
    #[error("Cursor state error: {0}")]
    CursorState(String),

    /// Side connection or schema discovery failed.
    #[error("Metadata resolution error: {0}")]
    Metadata(String),

    /// The current result set does not fit the requested type.
    #[error("Materialization error: {0}")]
    Materialize(String),

    #[error("Value conversion error: {0}")]
    Conversion(String),

    /// An extraction call disagreed with the expected result-set shapes.
    #[error("Result shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("SQL execution error: {0}")]
    Execution(String),

    #[error("Other database error: {0}")]
    Other(String),
}

impl SqlMultisetError {
    /// True for errors raised because the extractor could not serve the call at all.
    #[must_use]
    pub fn is_cursor_state(&self) -> bool {
        matches!(self, Self::CursorState(_))
    }
}

impl From<tokio::task::JoinError> for SqlMultisetError {
    fn from(err: tokio::task::JoinError) -> Self {
        SqlMultisetError::Execution(format!("blocking task join error: {err}"))
    }
}
