// SQLite backend
//
// - config: connection options and the blocking-task bridge
// - cursor: blocking batch cursor over `rusqlite::Batch`
// - worker: async batch cursor driven by a dedicated thread
// - schema: side-connection schema discovery through `pragma_table_info`

pub mod config;
pub mod cursor;
pub mod schema;
pub mod worker;

pub use config::{SharedSqliteConnection, SqliteOptions, SqliteOptionsBuilder};
pub use cursor::{SqliteCursor, sqlite_extract_value};
pub use schema::{SqliteProvider, describe_table};
pub use worker::AsyncSqliteCursor;
