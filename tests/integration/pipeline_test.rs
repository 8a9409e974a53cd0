//! End-to-end pipeline tests against the in-memory store and model.

use std::sync::Arc;

use db_ask::db::{MockStore, Row};
use db_ask::error::ErrorCode;
use db_ask::llm::MockLlmClient;
use db_ask::orchestrator::QuestionRequest;
use pretty_assertions::assert_eq;
use tokio_util::sync::CancellationToken;

use super::common::{brand_schema, orchestrator};

fn brands(n: i64) -> Vec<Row> {
    (1..=n)
        .map(|i| {
            Row::new()
                .with("BR_CODE", i)
                .with("BR_DESC", format!("Brand {i}"))
        })
        .collect()
}

#[tokio::test]
async fn test_delete_request_is_refused_before_generation() {
    let store = Arc::new(MockStore::new().with_schema(brand_schema()));
    let llm = Arc::new(MockLlmClient::new());
    let orch = orchestrator(store.clone(), llm.clone());

    let response = orch
        .ask(&QuestionRequest::new("Delete all brands"), &CancellationToken::new())
        .await;

    assert_eq!(response.error_code, Some(ErrorCode::ModelRefusal));
    assert!(response.rows.is_empty());
    assert!(llm.calls().is_empty());
    assert!(store.executed().is_empty());
}

#[tokio::test]
async fn test_show_all_brands() {
    let store = Arc::new(
        MockStore::new()
            .with_schema(brand_schema())
            .with_rows("EDC_BRAND", brands(3)),
    );
    let llm = Arc::new(
        MockLlmClient::new().with_response("all brands", "SELECT * FROM [EDC_BRAND]"),
    );
    let orch = orchestrator(store.clone(), llm);

    let response = orch
        .ask(&QuestionRequest::new("Show me all brands"), &CancellationToken::new())
        .await;

    assert!(response.is_success());
    assert_eq!(response.rows, brands(3));
    assert!(!response.truncated);
    assert_eq!(response.total_count_estimate, Some(3));
    assert_eq!(response.sql_query.as_deref(), Some("SELECT * FROM [EDC_BRAND]"));
}

#[tokio::test]
async fn test_stacked_statement_never_executes() {
    let store = Arc::new(MockStore::new().with_schema(brand_schema()));
    let llm = Arc::new(MockLlmClient::new().with_response(
        "brands",
        "SELECT * FROM [EDC_BRAND]; DROP TABLE [EDC_BRAND]",
    ));
    let orch = orchestrator(store.clone(), llm);

    let response = orch
        .ask(&QuestionRequest::new("list brands"), &CancellationToken::new())
        .await;

    assert_eq!(response.error_code, Some(ErrorCode::MultiStatementRejected));
    assert!(store.executed().is_empty());
}

#[tokio::test]
async fn test_update_is_a_policy_violation_citing_the_verb() {
    let store = Arc::new(MockStore::new().with_schema(brand_schema()));
    let llm = Arc::new(
        MockLlmClient::new().with_response("brands", "UPDATE [EDC_BRAND] SET BR_DESC='x'"),
    );
    let orch = orchestrator(store.clone(), llm);

    let response = orch
        .ask(&QuestionRequest::new("set the brands to x"), &CancellationToken::new())
        .await;

    assert_eq!(response.error_code, Some(ErrorCode::PolicyViolation));
    assert!(response.error_message.unwrap().contains("'UPDATE'"));
    assert!(store.executed().is_empty());
}

#[tokio::test]
async fn test_large_result_is_capped_with_estimate() {
    let store = Arc::new(
        MockStore::new()
            .with_schema(brand_schema())
            .with_rows("EDC_BRAND", brands(1500)),
    );
    let orch = orchestrator(store.clone(), Arc::new(MockLlmClient::new()));

    let response = orch
        .ask(&QuestionRequest::new("Show me all brands"), &CancellationToken::new())
        .await;

    assert!(response.is_success());
    assert!(response.truncated);
    assert_eq!(response.rows.len(), 1000);
    assert_eq!(response.total_count_estimate, Some(1500));

    let executed = store.executed();
    assert_eq!(executed[0], "SELECT * FROM [EDC_BRAND] LIMIT 1001");
    assert_eq!(
        executed[1],
        "SELECT COUNT(*) FROM (SELECT * FROM [EDC_BRAND]) AS total_count"
    );
}

#[tokio::test]
async fn test_comment_hidden_statement_is_not_reconstructed() {
    let store = Arc::new(
        MockStore::new()
            .with_schema(brand_schema())
            .with_rows("EDC_BRAND", brands(2)),
    );
    let llm = Arc::new(MockLlmClient::new().with_response(
        "codes",
        "SELECT BR_CODE FROM [EDC_BRAND] -- ; DROP TABLE [EDC_BRAND]",
    ));
    let orch = orchestrator(store.clone(), llm);

    let response = orch
        .ask(&QuestionRequest::new("brand codes"), &CancellationToken::new())
        .await;

    assert!(response.is_success());
    assert_eq!(
        response.sql_query.as_deref(),
        Some("SELECT BR_CODE FROM [EDC_BRAND]")
    );
    assert_eq!(
        store.executed(),
        vec!["SELECT BR_CODE FROM [EDC_BRAND] LIMIT 1001".to_string()]
    );
}

#[tokio::test]
async fn test_failed_estimate_still_returns_rows() {
    let store = Arc::new(
        MockStore::new()
            .with_schema(brand_schema())
            .with_rows("EDC_BRAND", brands(1200))
            .with_failing_count(),
    );
    let orch = orchestrator(store, Arc::new(MockLlmClient::new()));

    let response = orch
        .ask(&QuestionRequest::new("Show me all brands"), &CancellationToken::new())
        .await;

    assert!(response.is_success());
    assert!(response.truncated);
    assert_eq!(response.total_count_estimate, None);
}

#[tokio::test]
async fn test_requests_share_one_orchestrator() {
    let store = Arc::new(
        MockStore::new()
            .with_schema(brand_schema())
            .with_rows("EDC_BRAND", brands(2)),
    );
    let orch = Arc::new(orchestrator(store, Arc::new(MockLlmClient::new())));

    let handles: Vec<_> = ["Show me all brands", "Delete all brands", "What is love?"]
        .into_iter()
        .map(|question| {
            let orch = Arc::clone(&orch);
            tokio::spawn(async move {
                orch.ask(&QuestionRequest::new(question), &CancellationToken::new())
                    .await
                    .error_code
            })
        })
        .collect();

    let mut codes = Vec::new();
    for handle in handles {
        codes.push(handle.await.unwrap());
    }
    assert_eq!(
        codes,
        vec![
            None,
            Some(ErrorCode::ModelRefusal),
            Some(ErrorCode::UnanswerableQuestion)
        ]
    );
}
