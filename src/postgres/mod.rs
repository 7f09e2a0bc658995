// Postgres backend
//
// - config: connection options and the connection/driver-task pair
// - cursor: async batch cursor over simple-query messages
// - schema: side-connection schema discovery through information_schema

pub mod config;
pub mod cursor;
pub mod schema;

pub use config::{PostgresConnection, PostgresOptions, PostgresOptionsBuilder};
pub use cursor::PostgresCursor;
pub use schema::{PostgresProvider, describe_table};
