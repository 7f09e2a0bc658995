//! Schema sources used by the metadata resolver.
//!
//! A provider knows how to reach the database behind the primary connection a second time.
//! The primary connection is busy with an open cursor, so discovery always runs on a side
//! connection opened from the same connection string.

use std::any::TypeId;

use async_trait::async_trait;

use crate::error::SqlMultisetError;
use crate::metadata::ColumnDescriptor;
use crate::types::TransactionContext;

/// Blocking schema source.
pub trait SchemaProvider {
    type SideConnection;

    /// Identity of the connection implementation behind the primary connection.
    fn connection_type(&self) -> TypeId;

    /// Literal connection string of the primary connection, when one could be retrieved.
    fn connection_string(&self) -> Option<&str>;

    /// Open a fresh connection to the same database.
    ///
    /// A side connection that is dropped instead of closed, for instance when a suspending
    /// caller is cancelled, must still release everything it holds.
    ///
    /// # Errors
    /// Returns `SqlMultisetError` if the connection cannot be opened.
    fn open_side_connection(&self) -> Result<Self::SideConnection, SqlMultisetError>;

    /// Describe the columns of `table`, in table order.
    ///
    /// # Errors
    /// Returns `SqlMultisetError` if the schema query fails.
    fn describe_columns(
        &self,
        side: &mut Self::SideConnection,
        table: &str,
        transaction: Option<&TransactionContext>,
    ) -> Result<Vec<ColumnDescriptor>, SqlMultisetError>;

    /// Close a side connection opened by [`open_side_connection`](Self::open_side_connection).
    ///
    /// # Errors
    /// Returns `SqlMultisetError` if the provider reports a failure while closing.
    fn close_side_connection(&self, side: Self::SideConnection) -> Result<(), SqlMultisetError> {
        drop(side);
        Ok(())
    }
}

/// Suspending schema source; see [`SchemaProvider`].
#[async_trait]
pub trait AsyncSchemaProvider: Sync {
    type SideConnection: Send;

    fn connection_type(&self) -> TypeId;

    fn connection_string(&self) -> Option<&str>;

    /// See [`SchemaProvider::open_side_connection`]; dropping the side connection releases it.
    ///
    /// # Errors
    /// Returns `SqlMultisetError` if the connection cannot be opened.
    async fn open_side_connection(&self) -> Result<Self::SideConnection, SqlMultisetError>;

    /// # Errors
    /// Returns `SqlMultisetError` if the schema query fails.
    async fn describe_columns(
        &self,
        side: &mut Self::SideConnection,
        table: &str,
        transaction: Option<&TransactionContext>,
    ) -> Result<Vec<ColumnDescriptor>, SqlMultisetError>;

    /// # Errors
    /// Returns `SqlMultisetError` if the provider reports a failure while closing.
    async fn close_side_connection(
        &self,
        side: Self::SideConnection,
    ) -> Result<(), SqlMultisetError> {
        drop(side);
        Ok(())
    }
}
