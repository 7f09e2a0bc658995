use std::sync::Arc;
use std::time::Duration;

use rusqlite::{Connection, OpenFlags};
use tokio::sync::Mutex;

use crate::error::SqlMultisetError;

/// A `SQLite` connection that async code hands to blocking tasks.
pub type SharedSqliteConnection = Arc<Mutex<Connection>>;

const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Options for opening primary and side `SQLite` connections.
#[derive(Debug, Clone)]
pub struct SqliteOptions {
    pub db_path: String,
    pub busy_timeout: Duration,
    /// Open side connections read-only; schema discovery never writes.
    pub read_only_side_connections: bool,
}

impl SqliteOptions {
    #[must_use]
    pub fn new(db_path: impl Into<String>) -> Self {
        Self {
            db_path: db_path.into(),
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
            read_only_side_connections: true,
        }
    }

    #[must_use]
    pub fn builder(db_path: impl Into<String>) -> SqliteOptionsBuilder {
        SqliteOptionsBuilder::new(db_path)
    }

    /// Open the connection a batch will run on.
    ///
    /// # Errors
    /// Returns `SqlMultisetError::SqliteError` if the database cannot be opened.
    pub fn open_primary(&self) -> Result<Connection, SqlMultisetError> {
        let conn = Connection::open(&self.db_path)?;
        conn.busy_timeout(self.busy_timeout)?;
        Ok(conn)
    }

    /// Open the primary connection wrapped for use with the async cursor.
    ///
    /// # Errors
    /// Returns `SqlMultisetError` if the database cannot be opened or the blocking task fails.
    pub async fn open_shared(&self) -> Result<SharedSqliteConnection, SqlMultisetError> {
        let opts = self.clone();
        let conn = tokio::task::spawn_blocking(move || opts.open_primary()).await??;
        Ok(Arc::new(Mutex::new(conn)))
    }

    /// Whether a second connection to `db_path` reaches the same database. Plain in-memory
    /// and temporary databases are private to the connection that created them; a
    /// `file:name?mode=memory&cache=shared` URI is not.
    #[must_use]
    pub fn is_shareable(&self) -> bool {
        let path = self.db_path.trim();
        if path.is_empty() || path == ":memory:" {
            return false;
        }
        if let Some(uri) = path.strip_prefix("file:") {
            let private_memory = uri.starts_with(":memory:") || uri.contains("mode=memory");
            return !private_memory || uri.contains("cache=shared");
        }
        true
    }

    /// Open an independent connection to the same database for schema discovery.
    ///
    /// # Errors
    /// Returns `SqlMultisetError::Metadata` if the database is private to its primary
    /// connection or the connection cannot be opened.
    pub fn open_side(&self) -> Result<Connection, SqlMultisetError> {
        if !self.is_shareable() {
            return Err(SqlMultisetError::Metadata(format!(
                "side connection needs a file-backed or shared-cache database, got '{}'",
                self.db_path
            )));
        }
        let mut flags = OpenFlags::SQLITE_OPEN_URI | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        if self.read_only_side_connections {
            flags |= OpenFlags::SQLITE_OPEN_READ_ONLY;
        } else {
            flags |= OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE;
        }
        let conn = Connection::open_with_flags(&self.db_path, flags).map_err(|e| {
            SqlMultisetError::Metadata(format!(
                "failed to open side connection to '{}': {e}",
                self.db_path
            ))
        })?;
        conn.busy_timeout(self.busy_timeout)?;
        Ok(conn)
    }
}

/// Fluent builder for [`SqliteOptions`].
#[derive(Debug, Clone)]
pub struct SqliteOptionsBuilder {
    opts: SqliteOptions,
}

impl SqliteOptionsBuilder {
    #[must_use]
    pub fn new(db_path: impl Into<String>) -> Self {
        Self {
            opts: SqliteOptions::new(db_path),
        }
    }

    #[must_use]
    pub fn busy_timeout(mut self, busy_timeout: Duration) -> Self {
        self.opts.busy_timeout = busy_timeout;
        self
    }

    #[must_use]
    pub fn read_only_side_connections(mut self, read_only: bool) -> Self {
        self.opts.read_only_side_connections = read_only;
        self
    }

    #[must_use]
    pub fn finish(self) -> SqliteOptions {
        self.opts
    }
}

/// Run synchronous `rusqlite` work on the blocking pool.
pub(crate) async fn run_blocking<F, R>(
    conn: SharedSqliteConnection,
    func: F,
) -> Result<R, SqlMultisetError>
where
    F: FnOnce(&mut Connection) -> Result<R, SqlMultisetError> + Send + 'static,
    R: Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let mut guard = conn.blocking_lock();
        func(&mut guard)
    })
    .await?
}
