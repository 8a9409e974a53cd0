//! Mock LLM client for testing.
//!
//! Provides deterministic responses based on input patterns.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{AskError, Result};
use crate::llm::types::{Message, Role};
use crate::llm::LlmClient;
use crate::safety::{INVALID_QUERY_SENTINEL, REFUSAL_SENTINEL};

/// One recorded call to the mock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub model: String,
    pub system: String,
    pub messages: Vec<Message>,
}

/// Mock LLM client that returns canned responses based on input patterns.
///
/// Used for unit testing without making real API calls.
#[derive(Debug, Default)]
pub struct MockLlmClient {
    /// Custom response mappings (pattern -> response).
    custom_responses: Vec<(String, String)>,
    /// Fails every call with this message.
    error: Option<String>,
    /// Sleeps before answering.
    delay: Option<Duration>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl MockLlmClient {
    /// Creates a new mock client with default responses.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a custom response mapping.
    ///
    /// When the question contains `pattern`, the mock returns `response`.
    /// Mappings are tried in insertion order before the built-in ones.
    pub fn with_response(mut self, pattern: impl Into<String>, response: impl Into<String>) -> Self {
        self.custom_responses.push((pattern.into(), response.into()));
        self
    }

    /// Makes every call fail with an LLM error.
    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error = Some(message.into());
        self
    }

    /// Delays every response.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Calls received so far.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Generates a mock response based on the input.
    fn mock_response(&self, input: &str) -> String {
        let input_lower = input.to_lowercase();

        for (pattern, response) in &self.custom_responses {
            if input_lower.contains(&pattern.to_lowercase()) {
                return response.clone();
            }
        }

        let writes = ["delete", "drop", "update", "insert", "truncate", "remove"];
        if writes.iter().any(|w| input_lower.contains(w)) {
            return REFUSAL_SENTINEL.to_string();
        }

        if input_lower.contains("all brands") {
            return "```sql\nSELECT * FROM [EDC_BRAND];\n```".to_string();
        }

        if input_lower.contains("how many") && input_lower.contains("brands") {
            return "SELECT COUNT(*) AS brand_count FROM [EDC_BRAND]".to_string();
        }

        INVALID_QUERY_SENTINEL.to_string()
    }

    /// Extracts the last user message content from a message list.
    fn extract_user_input(messages: &[Message]) -> String {
        messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, model: &str, system: &str, messages: &[Message]) -> Result<String> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(RecordedCall {
                model: model.to_string(),
                system: system.to_string(),
                messages: messages.to_vec(),
            });
        }

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(message) = &self.error {
            return Err(AskError::llm(message.clone()));
        }

        let input = Self::extract_user_input(messages);
        Ok(self.mock_response(&input))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn ask(client: &MockLlmClient, question: &str) -> Result<String> {
        client
            .complete("mock", "system", &[Message::user(question)])
            .await
    }

    #[tokio::test]
    async fn test_mock_returns_select_all_brands() {
        let client = MockLlmClient::new();
        let response = ask(&client, "Show me all brands").await.unwrap();
        assert!(response.contains("SELECT * FROM [EDC_BRAND]"));
    }

    #[tokio::test]
    async fn test_mock_refuses_writes() {
        let client = MockLlmClient::new();
        assert_eq!(ask(&client, "Delete all brands").await.unwrap(), "READ_ONLY_ERROR");
        assert_eq!(ask(&client, "UPDATE the prices").await.unwrap(), "READ_ONLY_ERROR");
    }

    #[tokio::test]
    async fn test_mock_unknown_question() {
        let client = MockLlmClient::new();
        let response = ask(&client, "What is the meaning of life?").await.unwrap();
        assert_eq!(response, "INVALID_QUERY");
    }

    #[tokio::test]
    async fn test_mock_custom_response_takes_precedence() {
        let client = MockLlmClient::new().with_response("delete", "SELECT 1");
        assert_eq!(ask(&client, "Delete all brands").await.unwrap(), "SELECT 1");
    }

    #[tokio::test]
    async fn test_mock_records_calls() {
        let client = MockLlmClient::new();
        let messages = vec![
            Message::user("Show me all brands"),
            Message::assistant("SELECT * FROM [EDC_BRAND]"),
            Message::user("How many brands are there?"),
        ];
        let response = client.complete("gpt-4o", "rules", &messages).await.unwrap();
        assert!(response.contains("COUNT(*)"));

        let calls = client.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].model, "gpt-4o");
        assert_eq!(calls[0].system, "rules");
        assert_eq!(calls[0].messages, messages);
    }

    #[tokio::test]
    async fn test_mock_error() {
        let client = MockLlmClient::new().with_error("rate limited");
        let err = ask(&client, "Show me all brands").await.unwrap_err();
        assert!(matches!(err, AskError::Llm(_)));
    }

    #[test]
    fn test_mock_blocking_call() {
        let client = MockLlmClient::new();
        let response = tokio_test::block_on(ask(&client, "show me ALL BRANDS")).unwrap();
        assert!(response.contains("EDC_BRAND"));
    }
}
