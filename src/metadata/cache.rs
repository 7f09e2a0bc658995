use std::any::TypeId;
use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, LazyLock, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::column::ColumnDescriptor;

/// Shared, immutable list of descriptors for one table.
pub type ColumnList = Arc<[ColumnDescriptor]>;

static GLOBAL_CACHE: LazyLock<Arc<MetadataCache>> =
    LazyLock::new(|| Arc::new(MetadataCache::new()));

/// Identifies one cached descriptor list.
///
/// Derived from the connection implementation, the entity type and the connection string.
/// An empty or missing connection string is left out of the hash, which widens the key to
/// every database reached through the same connection type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey(u64);

impl CacheKey {
    #[must_use]
    pub fn new(connection_type: TypeId, entity_type: TypeId, connection_string: Option<&str>) -> Self {
        let mut hasher = DefaultHasher::new();
        connection_type.hash(&mut hasher);
        entity_type.hash(&mut hasher);
        if let Some(conn_str) = connection_string.filter(|s| !s.is_empty()) {
            conn_str.hash(&mut hasher);
        }
        Self(hasher.finish())
    }

    #[must_use]
    pub fn value(self) -> u64 {
        self.0
    }
}

/// Grow-only map from [`CacheKey`] to column descriptors.
///
/// Writers never replace an existing entry: the first list stored under a key wins and later
/// duplicates are dropped. Locks are held only for the map operation itself.
#[derive(Debug, Default)]
pub struct MetadataCache {
    entries: RwLock<HashMap<CacheKey, ColumnList>>,
}

impl MetadataCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide cache used by [`MetadataResolver::global`](super::MetadataResolver::global).
    #[must_use]
    pub fn global() -> Arc<MetadataCache> {
        Arc::clone(&GLOBAL_CACHE)
    }

    #[must_use]
    pub fn get(&self, key: CacheKey) -> Option<ColumnList> {
        self.read().get(&key).cloned()
    }

    /// Insert `columns` unless `key` is already present; returns the entry that is cached
    /// afterwards.
    pub fn put(&self, key: CacheKey, columns: ColumnList) -> ColumnList {
        let mut entries = self.write();
        Arc::clone(entries.entry(key).or_insert(columns))
    }

    #[must_use]
    pub fn contains(&self, key: CacheKey) -> bool {
        self.read().contains_key(&key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<CacheKey, ColumnList>> {
        // Entries are only ever inserted whole, so a poisoned map is still consistent.
        match self.entries.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<CacheKey, ColumnList>> {
        match self.entries.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
