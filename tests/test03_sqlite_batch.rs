#![cfg(feature = "sqlite")]

use std::sync::Arc;

use sql_multiset::prelude::*;
use sql_multiset::sqlite::describe_table;
use tempfile::tempdir;

const SCHEMA: &str = "
CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT NOT NULL, active BOOLEAN NOT NULL);
CREATE TABLE orders (id INTEGER PRIMARY KEY, user_id INTEGER NOT NULL, total REAL);
INSERT INTO users (id, name, active) VALUES (1, 'ada', 1), (2, 'grace', 0);
";

const BATCH: &str = "
UPDATE users SET name = name WHERE id = 0;
SELECT id, name, active FROM users ORDER BY id;
SELECT id, user_id, total FROM orders;
SELECT COUNT(*) + 40 AS answer FROM users;
";

#[derive(Debug, PartialEq)]
struct User {
    id: i64,
    name: String,
    active: bool,
}

impl Entity for User {
    fn table_name() -> &'static str {
        "users"
    }

    fn from_row(row: &EntityRow<'_>) -> Result<Self, SqlMultisetError> {
        Ok(User {
            id: row.get("id")?,
            name: row.get("name")?,
            active: row.get("active")?,
        })
    }
}

#[derive(Debug)]
struct Order {
    id: i64,
    user_id: i64,
    total: Option<f64>,
}

impl Entity for Order {
    fn table_name() -> &'static str {
        "orders"
    }

    fn from_row(row: &EntityRow<'_>) -> Result<Self, SqlMultisetError> {
        Ok(Order {
            id: row.get("id")?,
            user_id: row.get("user_id")?,
            total: row.get_opt("total")?,
        })
    }
}

fn unique_db_path(prefix: &str) -> String {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join(format!("{prefix}.db"));
    // Leak the tempdir so the file persists for the duration of the test binary.
    std::mem::forget(dir);
    path.to_string_lossy().into_owned()
}

fn seeded(prefix: &str) -> Result<SqliteOptions, SqlMultisetError> {
    let options = SqliteOptions::new(unique_db_path(prefix));
    let conn = options.open_primary()?;
    conn.execute_batch(SCHEMA)?;
    Ok(options)
}

fn isolated() -> MetadataResolver {
    MetadataResolver::new(Arc::new(MetadataCache::new()))
}

#[test]
fn blocking_cursor_walks_every_result_set() -> Result<(), Box<dyn std::error::Error>> {
    let options = seeded("blocking")?;
    let provider = SqliteProvider::new(options.clone());
    let mut conn = options.open_primary()?;

    let cursor = SqliteCursor::execute(&mut conn, BATCH)?;
    let mut extractor = Extractor::new(cursor, &provider).with_resolver(isolated());
    assert_eq!(extractor.position(), Position::At(0));

    let users: Vec<User> = extractor.extract()?;
    assert_eq!(
        users,
        vec![
            User { id: 1, name: "ada".into(), active: true },
            User { id: 2, name: "grace".into(), active: false },
        ]
    );
    let orders: Vec<Order> = extractor.extract()?;
    assert!(orders.is_empty());
    let answer: Option<i64> = extractor.extract_scalar()?;
    assert_eq!(answer, Some(42));
    assert_eq!(extractor.position(), Position::Exhausted);
    extractor.finish()?;

    // The primary connection is usable again once the extractor is gone.
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
    assert_eq!(count, 2);
    Ok(())
}

#[test]
fn next_result_skips_without_reading() -> Result<(), Box<dyn std::error::Error>> {
    let options = seeded("skip")?;
    let provider = SqliteProvider::new(options.clone());
    let mut conn = options.open_primary()?;

    let cursor = SqliteCursor::execute(&mut conn, BATCH)?;
    let mut extractor = Extractor::new(cursor, &provider).with_resolver(isolated());
    assert!(extractor.next_result()?);
    assert!(extractor.next_result()?);
    assert_eq!(extractor.position(), Position::At(2));
    let rows = extractor.extract_dynamic()?;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("answer"), Some(&RowValues::Int(42)));
    assert!(!extractor.next_result()?);
    Ok(())
}

#[test]
fn failing_statement_after_first_set_faults() -> Result<(), Box<dyn std::error::Error>> {
    let options = seeded("fault")?;
    let provider = SqliteProvider::new(options.clone());
    let mut conn = options.open_primary()?;

    let batch = "SELECT 1 AS one; SELECT * FROM missing_table;";
    let cursor = SqliteCursor::execute(&mut conn, batch)?;
    let mut extractor = Extractor::new(cursor, &provider).with_resolver(isolated());
    assert!(extractor.extract_scalar::<i64>().is_err());
    assert_eq!(extractor.position(), Position::Faulted);
    extractor.dispose()?;
    Ok(())
}

#[test]
fn describe_table_reports_keys_and_nullability() -> Result<(), Box<dyn std::error::Error>> {
    let options = seeded("describe")?;
    let mut side = options.open_side()?;

    let tx = TransactionContext::new(IsolationLevel::Serializable).read_only(true);
    let columns = describe_table(&mut side, "users", Some(&tx))?;
    let names: Vec<&str> = columns.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, ["id", "name", "active"]);
    assert!(columns[0].primary_key && columns[0].identity && !columns[0].nullable);
    assert!(!columns[1].nullable && !columns[1].primary_key);
    assert_eq!(columns[2].affinity(), ColumnAffinity::Boolean);

    assert!(describe_table(&mut side, "missing_table", None)?.is_empty());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn async_cursor_matches_blocking_results() -> Result<(), Box<dyn std::error::Error>> {
    let options = seeded("async")?;
    let provider = SqliteProvider::new(options.clone());
    let shared = options.open_shared().await?;

    let cursor = AsyncSqliteCursor::execute(Arc::clone(&shared), BATCH).await?;
    let mut extractor = AsyncExtractor::new(cursor, &provider)
        .with_resolver(isolated())
        .with_transaction(TransactionContext::default());

    let users: Vec<User> = extractor.extract().await?;
    assert_eq!(users.len(), 2);
    assert!(users[0].active && !users[1].active);
    let orders: Vec<Order> = extractor.extract().await?;
    assert!(orders.is_empty());
    assert_eq!(extractor.extract_scalar::<i64>().await?, Some(42));
    assert_eq!(extractor.position(), Position::Exhausted);
    extractor.finish().await?;

    // Closing the cursor released the shared connection.
    let guard = shared.lock().await;
    let count: i64 = guard.query_row("SELECT COUNT(*) FROM orders", [], |row| row.get(0))?;
    assert_eq!(count, 0);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn async_cursor_streams_large_result_sets() -> Result<(), Box<dyn std::error::Error>> {
    let options = seeded("large")?;
    let provider = SqliteProvider::new(options.clone());
    let shared = options.open_shared().await?;

    let batch = "
        WITH RECURSIVE n(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM n WHERE x < 1000)
        SELECT x FROM n;
        SELECT 'done';";
    let cursor = AsyncSqliteCursor::execute(shared, batch).await?;
    let mut extractor = AsyncExtractor::new(cursor, &provider).with_resolver(isolated());
    let rows = extractor.extract_dynamic().await?;
    assert_eq!(rows.len(), 1000);
    assert_eq!(rows[999].get_by_index(0), Some(&RowValues::Int(1000)));
    assert_eq!(extractor.extract_scalar::<String>().await?, Some("done".to_string()));
    extractor.finish().await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn blocking_and_async_providers_share_the_cache() -> Result<(), Box<dyn std::error::Error>> {
    let options = seeded("shared-cache")?;
    let provider = SqliteProvider::new(options);
    let resolver = isolated();

    let blocking = resolver.ensure_metadata::<User, SqliteProvider>(&provider, None)?;
    let suspending = resolver
        .ensure_metadata_async::<User, SqliteProvider>(&provider, None)
        .await?;
    assert!(Arc::ptr_eq(&blocking, &suspending));
    assert_eq!(resolver.cache().len(), 1);
    Ok(())
}

#[test]
fn private_in_memory_database_fails_discovery_up_front() -> Result<(), Box<dyn std::error::Error>> {
    let mut conn = SqliteOptions::new(":memory:").open_primary()?;
    conn.execute_batch(SCHEMA)?;
    let provider = SqliteProvider::from_connection(&conn);
    assert!(!provider.options().is_shareable());

    let cursor = SqliteCursor::execute(&mut conn, BATCH)?;
    let mut extractor = Extractor::new(cursor, &provider).with_resolver(isolated());
    match extractor.extract::<User>() {
        Err(SqlMultisetError::Metadata(msg)) => assert!(msg.contains("shared-cache"), "{msg}"),
        other => panic!("expected a metadata error, got {other:?}"),
    }
    assert_eq!(extractor.position(), Position::At(0));

    // Dynamic extraction needs no schema and still works.
    assert_eq!(extractor.extract_dynamic()?.len(), 2);
    Ok(())
}

#[test]
fn shared_cache_memory_database_is_discoverable() -> Result<(), Box<dyn std::error::Error>> {
    let options = SqliteOptions::builder("file:sql_multiset_shared_mem?mode=memory&cache=shared")
        .read_only_side_connections(false)
        .finish();
    assert!(options.is_shareable());
    let mut conn = options.open_primary()?;
    conn.execute_batch(SCHEMA)?;
    let provider = SqliteProvider::new(options);

    let cursor = SqliteCursor::execute(&mut conn, BATCH)?;
    let mut extractor = Extractor::new(cursor, &provider).with_resolver(isolated());
    let users: Vec<User> = extractor.extract()?;
    assert_eq!(users.len(), 2);
    assert!(users[0].active);
    Ok(())
}
