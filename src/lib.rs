//! Sequential extraction of the result sets produced by one multi-statement SQL batch.
//!
//! An [`Extractor`] (or [`AsyncExtractor`]) walks a batch cursor one result set at a time and
//! materializes each set as typed entities, dynamic rows or a single scalar. Column metadata for
//! entity types is discovered over a short-lived side connection and cached process-wide in
//! [`MetadataCache`], keyed by connection type, entity type and connection string.
//!
//! Backends: `SQLite` (feature `sqlite`, blocking and async cursors) and Postgres (feature
//! `postgres`, async cursor).

pub mod cursor;
pub mod error;
pub mod extractor;
pub mod materialize;
pub mod metadata;
pub mod prelude;
pub mod provider;
pub mod results;
pub mod types;

#[cfg(feature = "postgres")]
pub mod postgres;
#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use cursor::{AsyncResultCursor, ResultCursor};
pub use error::SqlMultisetError;
pub use extractor::{AsyncExtractor, ExpectedShape, Extractor, Position};
pub use materialize::{Entity, EntityRow};
pub use metadata::{
    CacheKey, ColumnAffinity, ColumnDescriptor, ColumnList, MetadataCache, MetadataResolver,
};
pub use provider::{AsyncSchemaProvider, SchemaProvider};
pub use results::DataRow;
pub use types::{FromRowValue, IsolationLevel, RowValues, TransactionContext};
