//! SQLite integration tests.
//!
//! Each test seeds its own temporary database file.

use std::sync::Arc;
use std::time::Duration;

use db_ask::chart::ChartType;
use db_ask::db::{DataStore, SchemaCatalog, Value};
use db_ask::error::{AskError, ErrorCode};
use db_ask::llm::MockLlmClient;
use db_ask::orchestrator::QuestionRequest;
use db_ask::safety::validate_sql;
use pretty_assertions::assert_eq;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use super::common::{open_sqlite, orchestrator, seed_sqlite};

async fn seeded(brands: u32) -> (TempDir, std::path::PathBuf) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("sales.db");
    seed_sqlite(&path, brands).await;
    (dir, path)
}

#[tokio::test]
async fn test_catalog_lists_tables_and_columns_in_order() {
    let (_dir, path) = seeded(3).await;
    let store = open_sqlite(&path).await;

    let snapshot = SchemaCatalog::new(store.clone(), Duration::from_secs(5))
        .capture()
        .await
        .unwrap();

    // no BRAND_SALES view, no sqlite_sequence
    let tables: Vec<&str> = snapshot.table_names().collect();
    assert_eq!(tables, vec!["EDC_BRAND", "SALES", "SECRET"]);

    let brand = snapshot.table("EDC_BRAND").unwrap();
    assert_eq!(brand[0].name, "BR_CODE");
    assert_eq!(brand[0].data_type, "integer");
    assert!(!brand[0].nullable);
    assert_eq!(brand[1].name, "BR_DESC");
    assert_eq!(brand[1].max_length, Some(100));
    assert!(brand[1].nullable);

    store.close().await.unwrap();
}

#[tokio::test]
async fn test_truncation_against_real_store() {
    let (_dir, path) = seeded(1500).await;
    let store = open_sqlite(&path).await;
    let orch = orchestrator(store.clone(), Arc::new(MockLlmClient::new()));

    let response = orch
        .ask(&QuestionRequest::new("Show me all brands"), &CancellationToken::new())
        .await;

    assert!(response.is_success(), "{:?}", response.error_message);
    assert!(response.truncated);
    assert_eq!(response.rows.len(), 1000);
    assert_eq!(response.total_count_estimate, Some(1500));
    assert_eq!(response.rows[0].get("BR_CODE"), Some(&Value::Int(1)));

    store.close().await.unwrap();
}

#[tokio::test]
async fn test_small_result_is_not_truncated() {
    let (_dir, path) = seeded(12).await;
    let store = open_sqlite(&path).await;
    let orch = orchestrator(store.clone(), Arc::new(MockLlmClient::new()));

    let response = orch
        .ask(
            &QuestionRequest::new("How many brands are there?"),
            &CancellationToken::new(),
        )
        .await;

    assert!(response.is_success(), "{:?}", response.error_message);
    assert!(!response.truncated);
    assert_eq!(response.rows.len(), 1);
    assert_eq!(response.rows[0].get("brand_count"), Some(&Value::Int(12)));
    assert_eq!(response.total_count_estimate, Some(1));
}

#[tokio::test]
async fn test_hallucinated_column_is_store_syntax_error() {
    let (_dir, path) = seeded(3).await;
    let store = open_sqlite(&path).await;
    let llm = MockLlmClient::new().with_response("names", "SELECT BR_NAME FROM EDC_BRAND");
    let orch = orchestrator(store.clone(), Arc::new(llm));

    let response = orch
        .ask(&QuestionRequest::new("brand names"), &CancellationToken::new())
        .await;

    assert_eq!(response.error_code, Some(ErrorCode::StoreSyntaxError));
    assert!(response.error_message.unwrap().contains("BR_NAME"));
}

#[tokio::test]
async fn test_store_is_opened_read_only() {
    let (_dir, path) = seeded(3).await;
    let store = open_sqlite(&path).await;

    // Bypasses the validator on purpose.
    let err = store
        .fetch_rows("DELETE FROM EDC_BRAND", 1)
        .await
        .unwrap_err();
    assert!(matches!(err, AskError::Query(_)), "{err:?}");

    let rows = store.fetch_rows("SELECT * FROM EDC_BRAND", 10).await.unwrap();
    assert_eq!(rows.len(), 3);
}

#[tokio::test]
async fn test_backtick_quoted_second_statement_never_runs() {
    let (_dir, path) = seeded(3).await;
    let store = open_sqlite(&path).await;
    let llm = MockLlmClient::new().with_response(
        "codes",
        "SELECT `BR_CODE'` FROM EDC_BRAND; SELECT PW AS `'` FROM SECRET",
    );
    let orch = orchestrator(store.clone(), Arc::new(llm));

    let response = orch
        .ask(&QuestionRequest::new("brand codes"), &CancellationToken::new())
        .await;

    assert_eq!(response.error_code, Some(ErrorCode::MultiStatementRejected));
    assert!(response.rows.is_empty());
}

#[tokio::test]
async fn test_backtick_identifiers_run_on_sqlite() {
    let (_dir, path) = seeded(2).await;
    let store = open_sqlite(&path).await;

    let accepted = validate_sql("SELECT `BR_CODE` AS `code;x` FROM `EDC_BRAND`")
        .into_result()
        .unwrap();
    let rows = store.fetch_rows(accepted.as_str(), 10).await.unwrap();

    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].get("code;x"), Some(&Value::Int(1)));
}

#[tokio::test]
async fn test_accepted_selects_run_on_read_only_store() {
    let (_dir, path) = seeded(5).await;
    let store = open_sqlite(&path).await;

    for sql in [
        "SELECT * FROM [EDC_BRAND] WHERE BR_DESC LIKE '%3%'",
        "select count(*) from SALES",
        "SELECT BR_CODE, SUM(AMOUNT) AS TOTAL FROM SALES GROUP BY BR_CODE ORDER BY TOTAL DESC",
        "SELECT * FROM EDC_BRAND LIMIT 2 -- trailing note",
    ] {
        let accepted = validate_sql(sql).into_result().unwrap();
        let result = store.fetch_rows(accepted.as_str(), 100).await;
        assert!(result.is_ok(), "{sql}: {result:?}");
    }
}

#[tokio::test]
async fn test_dated_result_gets_line_chart() {
    let (_dir, path) = seeded(3).await;
    let store = open_sqlite(&path).await;
    let llm = MockLlmClient::new().with_response(
        "over time",
        "SELECT SALE_DATE, SUM(AMOUNT) AS TOTAL_AMOUNT FROM SALES GROUP BY SALE_DATE ORDER BY SALE_DATE",
    );
    let orch = orchestrator(store.clone(), Arc::new(llm));

    let response = orch
        .ask(
            &QuestionRequest::new("Plot sales over time"),
            &CancellationToken::new(),
        )
        .await;

    assert!(response.is_success(), "{:?}", response.error_message);
    assert!(response.chart_requested);
    assert_eq!(response.rows.len(), 3);

    let spec = response.chart_spec.unwrap();
    assert_eq!(spec.chart_type, ChartType::Line);
    assert_eq!(spec.x_column.as_deref(), Some("SALE_DATE"));
    assert_eq!(spec.y_column, "TOTAL_AMOUNT");
}
