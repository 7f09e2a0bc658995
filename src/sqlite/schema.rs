use std::any::TypeId;
use std::sync::Arc;

use async_trait::async_trait;
use rusqlite::{Connection, TransactionBehavior};
use tokio::sync::Mutex;
use tracing::debug;

use super::config::{SharedSqliteConnection, SqliteOptions, run_blocking};
use crate::error::SqlMultisetError;
use crate::metadata::ColumnDescriptor;
use crate::provider::{AsyncSchemaProvider, SchemaProvider};
use crate::types::TransactionContext;

const TABLE_INFO_SQL: &str =
    "SELECT name, type, \"notnull\", pk FROM pragma_table_info(?1) ORDER BY cid";

/// Schema source for `SQLite` databases.
///
/// Implements both the blocking and the async provider traits. Both report
/// `rusqlite::Connection` as the connection type, so they share cache entries.
#[derive(Debug, Clone)]
pub struct SqliteProvider {
    options: SqliteOptions,
}

impl SqliteProvider {
    #[must_use]
    pub fn new(options: SqliteOptions) -> Self {
        Self { options }
    }

    /// Provider for the file database `conn` was opened on.
    ///
    /// In-memory and temporary databases report no path, so side connections cannot reach
    /// them and discovery fails with `SqlMultisetError::Metadata`. For a shared-cache
    /// in-memory database build the provider from its URI with [`SqliteProvider::new`].
    #[must_use]
    pub fn from_connection(conn: &Connection) -> Self {
        Self::new(SqliteOptions::new(conn.path().unwrap_or_default()))
    }

    #[must_use]
    pub fn options(&self) -> &SqliteOptions {
        &self.options
    }
}

/// Describe `table` through `pragma_table_info`. With a transaction context the query runs
/// inside a deferred read transaction on `conn`.
///
/// # Errors
/// Returns `SqlMultisetError::SqliteError` if the pragma query fails.
pub fn describe_table(
    conn: &mut Connection,
    table: &str,
    transaction: Option<&TransactionContext>,
) -> Result<Vec<ColumnDescriptor>, SqlMultisetError> {
    if transaction.is_none() {
        return read_table_info(conn, table);
    }
    let tx = conn.transaction_with_behavior(TransactionBehavior::Deferred)?;
    let columns = read_table_info(&tx, table)?;
    tx.commit()?;
    Ok(columns)
}

fn read_table_info(conn: &Connection, table: &str) -> Result<Vec<ColumnDescriptor>, SqlMultisetError> {
    let mut stmt = conn.prepare(TABLE_INFO_SQL)?;
    let rows = stmt.query_map([table], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, Option<String>>(1)?.unwrap_or_default(),
            row.get::<_, i64>(2)? != 0,
            row.get::<_, i64>(3)?,
        ))
    })?;
    let raw = rows.collect::<Result<Vec<_>, _>>()?;

    let pk_count = raw.iter().filter(|(_, _, _, pk)| *pk > 0).count();
    let columns: Vec<ColumnDescriptor> = raw
        .into_iter()
        .map(|(name, declared, not_null, pk)| {
            let primary_key = pk > 0;
            // Only a lone INTEGER PRIMARY KEY aliases the rowid and is generated on insert.
            let identity = primary_key && pk_count == 1 && declared.eq_ignore_ascii_case("INTEGER");
            ColumnDescriptor::new(name, declared)
                .nullable(!not_null && !identity)
                .primary_key(primary_key)
                .identity(identity)
        })
        .collect();
    debug!(table, columns = columns.len(), "described sqlite table");
    Ok(columns)
}

fn connection_string(options: &SqliteOptions) -> Option<&str> {
    Some(options.db_path.as_str()).filter(|path| !path.is_empty())
}

impl SchemaProvider for SqliteProvider {
    type SideConnection = Connection;

    fn connection_type(&self) -> TypeId {
        TypeId::of::<Connection>()
    }

    fn connection_string(&self) -> Option<&str> {
        connection_string(&self.options)
    }

    fn open_side_connection(&self) -> Result<Connection, SqlMultisetError> {
        debug!(db_path = %self.options.db_path, "opening sqlite side connection");
        self.options.open_side()
    }

    fn describe_columns(
        &self,
        side: &mut Connection,
        table: &str,
        transaction: Option<&TransactionContext>,
    ) -> Result<Vec<ColumnDescriptor>, SqlMultisetError> {
        describe_table(side, table, transaction)
    }

    fn close_side_connection(&self, side: Connection) -> Result<(), SqlMultisetError> {
        side.close().map_err(|(_, err)| SqlMultisetError::SqliteError(err))
    }
}

#[async_trait]
impl AsyncSchemaProvider for SqliteProvider {
    type SideConnection = SharedSqliteConnection;

    fn connection_type(&self) -> TypeId {
        TypeId::of::<Connection>()
    }

    fn connection_string(&self) -> Option<&str> {
        connection_string(&self.options)
    }

    async fn open_side_connection(&self) -> Result<SharedSqliteConnection, SqlMultisetError> {
        debug!(db_path = %self.options.db_path, "opening sqlite side connection");
        let options = self.options.clone();
        let conn = tokio::task::spawn_blocking(move || options.open_side()).await??;
        Ok(Arc::new(Mutex::new(conn)))
    }

    async fn describe_columns(
        &self,
        side: &mut SharedSqliteConnection,
        table: &str,
        transaction: Option<&TransactionContext>,
    ) -> Result<Vec<ColumnDescriptor>, SqlMultisetError> {
        let table = table.to_owned();
        let transaction = transaction.copied();
        run_blocking(Arc::clone(side), move |conn| {
            describe_table(conn, &table, transaction.as_ref())
        })
        .await
    }

    async fn close_side_connection(
        &self,
        side: SharedSqliteConnection,
    ) -> Result<(), SqlMultisetError> {
        match Arc::try_unwrap(side) {
            Ok(mutex) => {
                let conn = mutex.into_inner();
                tokio::task::spawn_blocking(move || {
                    conn.close().map_err(|(_, err)| SqlMultisetError::SqliteError(err))
                })
                .await?
            }
            // Another handle is still alive; it closes the connection when dropped.
            Err(_) => Ok(()),
        }
    }
}
