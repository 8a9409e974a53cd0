//! PostgreSQL integration tests.
//!
//! These tests require a running PostgreSQL database.
//! Set DATABASE_URL environment variable to run them.

use std::sync::Arc;
use std::time::Duration;

use db_ask::config::ConnectionConfig;
use db_ask::db::{DataStore, PostgresStore, SchemaCatalog, Value};
use db_ask::error::{AskError, ErrorCode};
use db_ask::llm::MockLlmClient;
use db_ask::orchestrator::QuestionRequest;
use tokio_util::sync::CancellationToken;

use super::common::orchestrator;

/// Helper to get test database URL from environment.
fn get_test_database_url() -> Option<String> {
    std::env::var("DATABASE_URL").ok()
}

/// Helper to create a test store.
async fn get_test_store() -> Option<Arc<dyn DataStore>> {
    let url = get_test_database_url()?;
    let config = ConnectionConfig::from_connection_string(&url).ok()?;
    let store = PostgresStore::connect(&config).await.ok()?;
    Some(Arc::new(store))
}

#[tokio::test]
async fn test_ping_and_simple_select() {
    let Some(store) = get_test_store().await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    store.ping().await.unwrap();
    let rows = store
        .fetch_rows("SELECT 1 AS num, 'hello' AS greeting, NULL::text AS nothing", 10)
        .await
        .unwrap();

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("num"), Some(&Value::Int(1)));
    assert_eq!(
        rows[0].get("greeting"),
        Some(&Value::Text("hello".to_string()))
    );
    assert_eq!(rows[0].get("nothing"), Some(&Value::Null));

    store.close().await.unwrap();
}

#[tokio::test]
async fn test_session_is_read_only() {
    let Some(store) = get_test_store().await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let err = store
        .fetch_rows("CREATE TABLE db_ask_should_not_exist (id int)", 1)
        .await
        .unwrap_err();
    assert!(matches!(err, AskError::Query(_)), "{err:?}");
    assert!(err.to_string().contains("read-only"), "{err}");

    store.close().await.unwrap();
}

#[tokio::test]
async fn test_non_text_types_are_not_nulled() {
    let Some(store) = get_test_store().await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let rows = store
        .fetch_rows(
            "SELECT '6f1e2d3c-0000-4000-8000-00000000abcd'::uuid AS id, \
                    '{\"a\": 1}'::jsonb AS doc, \
                    '12:30:00'::time AS at, \
                    '1 day'::interval AS span, \
                    'a b'::tsvector AS words, \
                    NULL::uuid AS missing",
            10,
        )
        .await
        .unwrap();

    let row = &rows[0];
    assert_eq!(
        row.get("id"),
        Some(&Value::Text("6f1e2d3c-0000-4000-8000-00000000abcd".to_string()))
    );
    assert_eq!(row.get("doc"), Some(&Value::Text("{\"a\":1}".to_string())));
    assert_eq!(row.get("at"), Some(&Value::Text("12:30:00".to_string())));
    assert_eq!(row.get("span"), Some(&Value::Text("1 days".to_string())));
    assert_eq!(row.get("words"), Some(&Value::Text("<tsvector>".to_string())));
    assert_eq!(row.get("missing"), Some(&Value::Null));

    store.close().await.unwrap();
}

#[tokio::test]
async fn test_catalog_capture() {
    let Some(store) = get_test_store().await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let snapshot = SchemaCatalog::new(store.clone(), Duration::from_secs(10))
        .capture()
        .await
        .unwrap();

    for (table, columns) in snapshot.tables() {
        assert!(!table.is_empty());
        assert!(!columns.is_empty(), "{table} has no columns");
    }

    store.close().await.unwrap();
}

#[tokio::test]
async fn test_catalog_excludes_views_and_system_tables() {
    let Some(url) = get_test_database_url() else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };
    // Setup needs a writable session; the store itself is read-only.
    let Ok(admin) = sqlx::PgPool::connect(&url).await else {
        eprintln!("Skipping test: cannot open a writable session");
        return;
    };
    for statement in [
        "CREATE TABLE IF NOT EXISTS db_ask_catalog_base (id int)",
        "CREATE OR REPLACE VIEW db_ask_catalog_view AS SELECT id FROM db_ask_catalog_base",
    ] {
        if sqlx::query(statement).execute(&admin).await.is_err() {
            eprintln!("Skipping test: role cannot create objects");
            return;
        }
    }

    let store = get_test_store().await.unwrap();
    let snapshot = SchemaCatalog::new(store.clone(), Duration::from_secs(10))
        .capture()
        .await
        .unwrap();
    let tables: Vec<&str> = snapshot.table_names().collect();

    assert!(tables.contains(&"db_ask_catalog_base"));
    assert!(!tables.contains(&"db_ask_catalog_view"));
    assert!(!tables.iter().any(|t| t.starts_with("pg_")));

    store.close().await.unwrap();
    for statement in [
        "DROP VIEW IF EXISTS db_ask_catalog_view",
        "DROP TABLE IF EXISTS db_ask_catalog_base",
    ] {
        sqlx::query(statement).execute(&admin).await.unwrap();
    }
    admin.close().await;
}

#[tokio::test]
async fn test_row_cap_and_count() {
    let Some(store) = get_test_store().await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let llm = MockLlmClient::new().with_response(
        "series",
        "SELECT n FROM generate_series(1, 1500) AS s(n)",
    );
    let orch = orchestrator(store.clone(), Arc::new(llm));

    let response = orch
        .ask(&QuestionRequest::new("number series"), &CancellationToken::new())
        .await;

    assert!(response.is_success(), "{:?}", response.error_message);
    assert!(response.truncated);
    assert_eq!(response.rows.len(), 1000);
    assert_eq!(response.total_count_estimate, Some(1500));

    store.close().await.unwrap();
}

#[tokio::test]
async fn test_unknown_column_reports_store_error() {
    let Some(store) = get_test_store().await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let llm = MockLlmClient::new().with_response(
        "ghost",
        "SELECT ghost_column FROM generate_series(1, 3) AS s(n)",
    );
    let orch = orchestrator(store.clone(), Arc::new(llm));

    let response = orch
        .ask(&QuestionRequest::new("the ghost column"), &CancellationToken::new())
        .await;

    assert_eq!(response.error_code, Some(ErrorCode::StoreSyntaxError));
    assert!(response.error_message.unwrap().contains("ghost_column"));

    store.close().await.unwrap();
}
