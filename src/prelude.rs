//! Convenient imports for common functionality.
//!
//! This module re-exports the types needed to run an extraction end to end.

pub use crate::cursor::{AsyncResultCursor, ResultCursor};
pub use crate::error::SqlMultisetError;
pub use crate::extractor::{AsyncExtractor, ExpectedShape, Extractor, Position};
pub use crate::materialize::{Entity, EntityRow};
pub use crate::metadata::{
    CacheKey, ColumnAffinity, ColumnDescriptor, MetadataCache, MetadataResolver,
};
pub use crate::provider::{AsyncSchemaProvider, SchemaProvider};
pub use crate::results::DataRow;
pub use crate::types::{FromRowValue, IsolationLevel, RowValues, TransactionContext};

#[cfg(feature = "postgres")]
pub use crate::postgres::{PostgresCursor, PostgresOptions, PostgresProvider};

#[cfg(feature = "sqlite")]
pub use crate::sqlite::{AsyncSqliteCursor, SqliteCursor, SqliteOptions, SqliteProvider};
