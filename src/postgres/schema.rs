use std::any::TypeId;

use async_trait::async_trait;
use tokio_postgres::{Client, GenericClient, IsolationLevel as PgIsolationLevel};
use tracing::debug;

use super::config::{PostgresConnection, PostgresOptions};
use crate::error::SqlMultisetError;
use crate::metadata::ColumnDescriptor;
use crate::provider::AsyncSchemaProvider;
use crate::types::{IsolationLevel, TransactionContext};

const COLUMNS_SQL: &str = "
SELECT c.column_name::text,
       c.data_type::text,
       c.is_nullable = 'YES',
       COALESCE(pk.is_primary, false),
       (c.is_identity = 'YES' OR COALESCE(c.column_default, '') LIKE 'nextval(%')
FROM information_schema.columns c
LEFT JOIN (
    SELECT kcu.column_name, true AS is_primary
    FROM information_schema.table_constraints tc
    JOIN information_schema.key_column_usage kcu
      ON tc.constraint_name = kcu.constraint_name
     AND tc.table_schema = kcu.table_schema
     AND tc.table_name = kcu.table_name
    WHERE tc.constraint_type = 'PRIMARY KEY'
      AND tc.table_schema = current_schema()
      AND tc.table_name = $1::text
) pk ON pk.column_name = c.column_name
WHERE c.table_schema = current_schema()
  AND c.table_name = $1::text
ORDER BY c.ordinal_position";

/// Schema source for Postgres; side connections come from the same connection string.
#[derive(Debug, Clone)]
pub struct PostgresProvider {
    options: PostgresOptions,
}

impl PostgresProvider {
    #[must_use]
    pub fn new(options: PostgresOptions) -> Self {
        Self { options }
    }

    #[must_use]
    pub fn options(&self) -> &PostgresOptions {
        &self.options
    }
}

fn pg_isolation(level: IsolationLevel) -> PgIsolationLevel {
    match level {
        IsolationLevel::ReadUncommitted => PgIsolationLevel::ReadUncommitted,
        IsolationLevel::ReadCommitted => PgIsolationLevel::ReadCommitted,
        IsolationLevel::RepeatableRead => PgIsolationLevel::RepeatableRead,
        IsolationLevel::Serializable => PgIsolationLevel::Serializable,
    }
}

async fn query_columns<C: GenericClient>(
    client: &C,
    table: &str,
) -> Result<Vec<ColumnDescriptor>, SqlMultisetError> {
    let rows = client.query(COLUMNS_SQL, &[&table]).await?;
    rows.iter()
        .map(|row| -> Result<ColumnDescriptor, SqlMultisetError> {
            Ok(ColumnDescriptor::new(row.try_get::<_, String>(0)?, row.try_get::<_, String>(1)?)
                .nullable(row.try_get(2)?)
                .primary_key(row.try_get(3)?)
                .identity(row.try_get(4)?))
        })
        .collect()
}

/// Describe `table` in the current schema. With a transaction context the query runs inside a
/// transaction of the same isolation level and access mode.
///
/// # Errors
/// Returns `SqlMultisetError::PostgresError` if the catalog query fails.
pub async fn describe_table(
    client: &mut Client,
    table: &str,
    transaction: Option<&TransactionContext>,
) -> Result<Vec<ColumnDescriptor>, SqlMultisetError> {
    let columns = match transaction {
        None => query_columns(client, table).await?,
        Some(ctx) => {
            let tx = client
                .build_transaction()
                .isolation_level(pg_isolation(ctx.isolation))
                .read_only(ctx.read_only)
                .start()
                .await?;
            let columns = query_columns(&tx, table).await?;
            tx.commit().await?;
            columns
        }
    };
    debug!(table, columns = columns.len(), "described postgres table");
    Ok(columns)
}

#[async_trait]
impl AsyncSchemaProvider for PostgresProvider {
    type SideConnection = PostgresConnection;

    fn connection_type(&self) -> TypeId {
        TypeId::of::<Client>()
    }

    fn connection_string(&self) -> Option<&str> {
        Some(self.options.connection_string.as_str()).filter(|s| !s.is_empty())
    }

    async fn open_side_connection(&self) -> Result<PostgresConnection, SqlMultisetError> {
        debug!("opening postgres side connection");
        self.options
            .connect()
            .await
            .map_err(|e| SqlMultisetError::Metadata(format!("failed to open side connection: {e}")))
    }

    async fn describe_columns(
        &self,
        side: &mut PostgresConnection,
        table: &str,
        transaction: Option<&TransactionContext>,
    ) -> Result<Vec<ColumnDescriptor>, SqlMultisetError> {
        describe_table(side.client_mut(), table, transaction).await
    }

    async fn close_side_connection(
        &self,
        side: PostgresConnection,
    ) -> Result<(), SqlMultisetError> {
        side.close().await
    }
}
