// Schema metadata: column descriptors, the process-wide descriptor cache and the resolver
// that fills it from side connections.

pub mod cache;
pub mod column;
pub mod resolver;

pub use cache::{CacheKey, ColumnList, MetadataCache};
pub use column::{ColumnAffinity, ColumnDescriptor};
pub use resolver::MetadataResolver;
