use std::any::TypeId;
use std::sync::Arc;

use tracing::{debug, warn};

use super::cache::{CacheKey, ColumnList, MetadataCache};
use super::column::ColumnDescriptor;
use crate::error::SqlMultisetError;
use crate::materialize::Entity;
use crate::provider::{AsyncSchemaProvider, SchemaProvider};
use crate::types::TransactionContext;

/// Resolves column descriptors for entity types, at most once per [`CacheKey`].
#[derive(Debug, Clone)]
pub struct MetadataResolver {
    cache: Arc<MetadataCache>,
}

impl Default for MetadataResolver {
    fn default() -> Self {
        Self::global()
    }
}

impl MetadataResolver {
    #[must_use]
    pub fn new(cache: Arc<MetadataCache>) -> Self {
        Self { cache }
    }

    /// Resolver backed by the process-wide cache.
    #[must_use]
    pub fn global() -> Self {
        Self::new(MetadataCache::global())
    }

    #[must_use]
    pub fn cache(&self) -> &Arc<MetadataCache> {
        &self.cache
    }

    /// Key under which descriptors for `T` reached through `provider` are cached.
    #[must_use]
    pub fn cache_key<T: Entity>(connection_type: TypeId, connection_string: Option<&str>) -> CacheKey {
        CacheKey::new(connection_type, TypeId::of::<T>(), connection_string)
    }

    /// Make sure descriptors for `T` are cached, running schema discovery on a side connection
    /// when they are not.
    ///
    /// # Errors
    /// Returns `SqlMultisetError` if the side connection cannot be opened, discovery fails or
    /// the table has no columns. Nothing is cached in that case.
    pub fn ensure_metadata<T, P>(
        &self,
        provider: &P,
        transaction: Option<&TransactionContext>,
    ) -> Result<ColumnList, SqlMultisetError>
    where
        T: Entity,
        P: SchemaProvider + ?Sized,
    {
        let key = Self::cache_key::<T>(provider.connection_type(), provider.connection_string());
        if let Some(columns) = self.cache.get(key) {
            return Ok(columns);
        }
        debug!(table = T::table_name(), key = key.value(), "metadata cache miss");

        let mut side = provider.open_side_connection()?;
        let described = provider.describe_columns(&mut side, T::table_name(), transaction);
        let closed = provider.close_side_connection(side);
        let columns = finish_discovery::<T>(described, closed)?;
        Ok(self.cache.put(key, columns))
    }

    /// Suspending form of [`ensure_metadata`](Self::ensure_metadata); produces the same cache
    /// entry for the same provider and entity.
    ///
    /// # Errors
    /// Same as [`ensure_metadata`](Self::ensure_metadata).
    pub async fn ensure_metadata_async<T, P>(
        &self,
        provider: &P,
        transaction: Option<&TransactionContext>,
    ) -> Result<ColumnList, SqlMultisetError>
    where
        T: Entity,
        P: AsyncSchemaProvider + ?Sized,
    {
        let key = Self::cache_key::<T>(provider.connection_type(), provider.connection_string());
        if let Some(columns) = self.cache.get(key) {
            return Ok(columns);
        }
        debug!(table = T::table_name(), key = key.value(), "metadata cache miss");

        let mut side = provider.open_side_connection().await?;
        let described = provider
            .describe_columns(&mut side, T::table_name(), transaction)
            .await;
        let closed = provider.close_side_connection(side).await;
        let columns = finish_discovery::<T>(described, closed)?;
        Ok(self.cache.put(key, columns))
    }
}

fn finish_discovery<T: Entity>(
    described: Result<Vec<ColumnDescriptor>, SqlMultisetError>,
    closed: Result<(), SqlMultisetError>,
) -> Result<ColumnList, SqlMultisetError> {
    let columns = described?;
    if let Err(err) = closed {
        // The descriptors are complete; a failed close only loses the side connection.
        warn!(table = T::table_name(), error = %err, "failed to close side connection");
    }
    if columns.is_empty() {
        return Err(SqlMultisetError::Metadata(format!(
            "no columns found for table '{}'",
            T::table_name()
        )));
    }
    debug!(table = T::table_name(), columns = columns.len(), "resolved column metadata");
    Ok(columns.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::materialize::{Entity, EntityRow};
    use crate::test_utils::MemoryProvider;
    use std::pin::{Pin, pin};
    use std::task::Poll;

    #[derive(Debug)]
    struct Gadget;

    impl Entity for Gadget {
        fn table_name() -> &'static str {
            "gadgets"
        }

        fn from_row(_row: &EntityRow<'_>) -> Result<Self, SqlMultisetError> {
            Ok(Gadget)
        }
    }

    fn provider() -> MemoryProvider {
        MemoryProvider::new("memory://resolver")
            .with_table("gadgets", vec![ColumnDescriptor::new("id", "INTEGER").primary_key(true)])
    }

    #[test]
    fn hit_skips_discovery() {
        let resolver = MetadataResolver::new(Arc::new(MetadataCache::new()));
        let provider = provider();
        resolver.ensure_metadata::<Gadget, _>(&provider, None).unwrap();
        resolver.ensure_metadata::<Gadget, _>(&provider, None).unwrap();
        assert_eq!(provider.describe_calls(), 1);
        assert_eq!(provider.open_side_connections(), 0);
    }

    #[test]
    fn failure_is_not_cached() {
        let cache = Arc::new(MetadataCache::new());
        let resolver = MetadataResolver::new(Arc::clone(&cache));
        let provider = provider();
        provider.fail_next_describe();
        assert!(resolver.ensure_metadata::<Gadget, _>(&provider, None).is_err());
        assert!(cache.is_empty());
        assert_eq!(provider.open_side_connections(), 0);

        resolver.ensure_metadata::<Gadget, _>(&provider, None).unwrap();
        assert_eq!(cache.len(), 1);
        assert_eq!(provider.describe_calls(), 2);
    }

    #[test]
    fn unknown_table_is_a_metadata_error() {
        let resolver = MetadataResolver::new(Arc::new(MetadataCache::new()));
        let provider = MemoryProvider::new("memory://empty");
        let err = resolver.ensure_metadata::<Gadget, _>(&provider, None).unwrap_err();
        assert!(matches!(err, SqlMultisetError::Metadata(_)));
    }

    #[tokio::test]
    async fn blocking_and_async_forms_share_entries() {
        let cache = Arc::new(MetadataCache::new());
        let resolver = MetadataResolver::new(Arc::clone(&cache));
        let provider = provider();
        let from_async = resolver
            .ensure_metadata_async::<Gadget, _>(&provider, None)
            .await
            .unwrap();
        let from_blocking = resolver.ensure_metadata::<Gadget, _>(&provider, None).unwrap();
        assert!(Arc::ptr_eq(&from_async, &from_blocking));
        assert_eq!(provider.describe_calls(), 1);
    }

    async fn poll_once<F: Future>(fut: &mut Pin<&mut F>) -> Poll<F::Output> {
        std::future::poll_fn(|cx| Poll::Ready(fut.as_mut().poll(cx))).await
    }

    #[tokio::test]
    async fn cancelled_discovery_releases_the_side_connection() {
        let cache = Arc::new(MetadataCache::new());
        let resolver = MetadataResolver::new(Arc::clone(&cache));
        let provider = provider();
        {
            let fut = resolver.ensure_metadata_async::<Gadget, _>(&provider, None);
            let mut fut = pin!(fut);
            // Suspended in open, then in describe with the side connection held.
            assert!(poll_once(&mut fut).await.is_pending());
            assert!(poll_once(&mut fut).await.is_pending());
            assert_eq!(provider.open_side_connections(), 1);
        }
        assert_eq!(provider.open_side_connections(), 0);
        assert!(cache.is_empty());

        resolver
            .ensure_metadata_async::<Gadget, _>(&provider, None)
            .await
            .unwrap();
        assert_eq!(cache.len(), 1);
        assert_eq!(provider.open_side_connections(), 0);
    }
}
