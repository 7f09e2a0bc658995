#![cfg(feature = "postgres")]

use std::sync::Arc;

use sql_multiset::prelude::*;

const PG_URL_VAR: &str = "SQL_MULTISET_PG_URL";

#[derive(Debug, PartialEq)]
struct Item {
    id: i64,
    label: String,
    enabled: bool,
    price: Option<f64>,
}

impl Entity for Item {
    fn table_name() -> &'static str {
        "sql_multiset_pg_items"
    }

    fn from_row(row: &EntityRow<'_>) -> Result<Self, SqlMultisetError> {
        Ok(Item {
            id: row.get("id")?,
            label: row.get("label")?,
            enabled: row.get("enabled")?,
            price: row.get_opt("price")?,
        })
    }
}

#[test]
fn options_reject_malformed_connection_strings() {
    let options = PostgresOptions::builder("host=localhost port=not-a-port")
        .application_name("sql-multiset-tests")
        .finish();
    assert!(matches!(options.config(), Err(SqlMultisetError::Config(_))));
}

#[tokio::test]
async fn simple_query_batch_round_trip() -> Result<(), Box<dyn std::error::Error>> {
    let Ok(url) = std::env::var(PG_URL_VAR) else {
        eprintln!("skipping: {PG_URL_VAR} not set");
        return Ok(());
    };
    let options = PostgresOptions::new(url);
    let primary = options.connect().await?;
    primary
        .client()
        .batch_execute(
            "DROP TABLE IF EXISTS sql_multiset_pg_items;
             CREATE TABLE sql_multiset_pg_items (
                 id BIGSERIAL PRIMARY KEY,
                 label TEXT NOT NULL,
                 enabled BOOLEAN NOT NULL,
                 price DOUBLE PRECISION
             );
             INSERT INTO sql_multiset_pg_items (label, enabled, price)
             VALUES ('first', true, 9.5), ('second', false, NULL);",
        )
        .await?;

    let provider = PostgresProvider::new(options.clone());
    let resolver = MetadataResolver::new(Arc::new(MetadataCache::new()));
    let batch = "
        UPDATE sql_multiset_pg_items SET label = label WHERE id < 0;
        SELECT id, label, enabled, price FROM sql_multiset_pg_items ORDER BY id;
        SELECT id, label, enabled, price FROM sql_multiset_pg_items WHERE false;
        SELECT 42;";
    let cursor = PostgresCursor::execute(primary.client(), batch).await?;
    let mut extractor = AsyncExtractor::new(cursor, &provider)
        .with_resolver(resolver.clone())
        .with_transaction(TransactionContext::new(IsolationLevel::RepeatableRead).read_only(true));

    let items: Vec<Item> = extractor.extract().await?;
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].label, "first");
    assert!(items[0].enabled && !items[1].enabled);
    assert_eq!(items[0].price, Some(9.5));
    assert_eq!(items[1].price, None);

    let none: Vec<Item> = extractor.extract().await?;
    assert!(none.is_empty());
    assert_eq!(extractor.extract_scalar::<i64>().await?, Some(42));
    assert_eq!(extractor.position(), Position::Exhausted);
    extractor.finish().await?;

    let columns = resolver
        .ensure_metadata_async::<Item, PostgresProvider>(&provider, None)
        .await?;
    assert!(columns[0].primary_key && columns[0].identity);
    assert!(!columns[1].nullable);
    assert_eq!(columns[3].affinity(), ColumnAffinity::Real);

    primary
        .client()
        .batch_execute("DROP TABLE sql_multiset_pg_items;")
        .await?;
    primary.close().await?;
    Ok(())
}
