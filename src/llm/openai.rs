//! OpenAI LLM client implementation.
//!
//! Implements the LlmClient trait for the chat completions API and any
//! gateway that speaks it.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{AskError, Result};
use crate::llm::types::Message;
use crate::llm::LlmClient;

/// Default timeout for API requests.
const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// OpenAI API base URL.
const OPENAI_API_URL: &str = "https://api.openai.com/v1";

/// Default number of attempts for transient errors.
const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Base delay for exponential backoff (milliseconds).
const RETRY_BASE_DELAY_MS: u64 = 1000;

/// Sampling temperature. Low, so the same question gives the same SQL.
const TEMPERATURE: f32 = 0.3;

/// Upper bound on generated tokens.
const MAX_TOKENS: u32 = 500;

/// OpenAI client configuration.
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    /// API key for authentication.
    pub api_key: String,
    /// API root, without the `/chat/completions` suffix.
    pub base_url: String,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
    /// Attempts per call, including the first.
    pub max_attempts: u32,
}

impl OpenAiConfig {
    /// Creates a new config with the given API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: OPENAI_API_URL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    /// Sets the API root.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Sets the request timeout.
    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    /// Sets the attempt count. Zero is treated as one.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }
}

/// OpenAI LLM client.
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    config: OpenAiConfig,
    client: Client,
}

impl OpenAiClient {
    /// Creates a new OpenAI client with the given configuration.
    pub fn new(config: OpenAiConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AskError::llm(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    /// Creates a client from environment variables.
    ///
    /// Reads `OPENAI_API_KEY` for the API key and `OPENAI_BASE_URL` for an
    /// optional endpoint override.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| AskError::llm("OPENAI_API_KEY environment variable not set"))?;

        let mut config = OpenAiConfig::new(api_key);
        if let Ok(url) = std::env::var("OPENAI_BASE_URL") {
            config = config.with_base_url(url);
        }
        Self::new(config)
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }

    /// Converts internal messages to OpenAI API format, system prompt first.
    fn convert_messages(system: &str, messages: &[Message]) -> Vec<OpenAiMessage> {
        std::iter::once(OpenAiMessage {
            role: "system".to_string(),
            content: system.to_string(),
        })
        .chain(messages.iter().map(|m| OpenAiMessage {
            role: m.role.as_str().to_string(),
            content: m.content.clone(),
        }))
        .collect()
    }

    /// Parses an API error response and returns (error, is_retryable).
    fn parse_error(status: reqwest::StatusCode, body: &str) -> (AskError, bool) {
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return (
                AskError::llm("Authentication failed. Check your OPENAI_API_KEY."),
                false,
            );
        }

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return (
                AskError::llm("Rate limited. Please wait and try again."),
                true,
            );
        }

        // 5xx errors are generally retryable
        let is_retryable = status.is_server_error();

        if let Ok(error_response) = serde_json::from_str::<OpenAiErrorResponse>(body) {
            return (
                AskError::llm(format!(
                    "OpenAI API error: {}",
                    error_response.error.message
                )),
                is_retryable,
            );
        }

        (
            AskError::llm(format!("OpenAI API error ({}): {}", status, body)),
            is_retryable,
        )
    }

    /// Determines if a request error is retryable.
    fn is_retryable_request_error(error: &reqwest::Error) -> bool {
        error.is_timeout() || error.is_connect()
    }

    fn map_request_error(error: &reqwest::Error) -> AskError {
        if error.is_timeout() {
            AskError::timeout("Generation request timed out")
        } else if error.is_connect() {
            AskError::llm("Failed to connect to the OpenAI API. Check your network.")
        } else {
            AskError::llm(format!("Request failed: {}", error))
        }
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn complete(&self, model: &str, system: &str, messages: &[Message]) -> Result<String> {
        let request = OpenAiRequest {
            model: model.to_string(),
            messages: Self::convert_messages(system, messages),
            temperature: TEMPERATURE,
            max_tokens: MAX_TOKENS,
        };

        let url = self.completions_url();
        let attempts = self.config.max_attempts.max(1);
        let mut last_error = AskError::llm("No request was sent");
        let mut delay = Duration::from_millis(RETRY_BASE_DELAY_MS);

        for attempt in 1..=attempts {
            debug!(model, attempt, attempts, "OpenAI API request");

            let result = self
                .client
                .post(&url)
                .header("Authorization", format!("Bearer {}", self.config.api_key))
                .header("Content-Type", "application/json")
                .json(&request)
                .send()
                .await;

            let is_retryable = match result {
                Ok(response) => {
                    let status = response.status();
                    let body = response
                        .text()
                        .await
                        .map_err(|e| AskError::llm(format!("Failed to read response: {}", e)))?;

                    if status.is_success() {
                        let response: OpenAiResponse =
                            serde_json::from_str(&body).map_err(|e| {
                                AskError::llm(format!("Failed to parse response: {}", e))
                            })?;

                        return response
                            .choices
                            .into_iter()
                            .next()
                            .and_then(|c| c.message.content)
                            .map(|content| content.trim().to_string())
                            .ok_or_else(|| AskError::llm("No response from OpenAI"));
                    }

                    let (error, is_retryable) = Self::parse_error(status, &body);
                    last_error = error;
                    is_retryable
                }
                Err(e) => {
                    last_error = Self::map_request_error(&e);
                    Self::is_retryable_request_error(&e)
                }
            };

            if !is_retryable || attempt >= attempts {
                break;
            }

            warn!(
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %last_error,
                "OpenAI API request failed, retrying"
            );
            tokio::time::sleep(delay).await;
            delay *= 2; // Exponential backoff
        }

        Err(last_error)
    }
}

// OpenAI API types

#[derive(Debug, Serialize)]
struct OpenAiRequest {
    model: String,
    messages: Vec<OpenAiMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct OpenAiMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiResponseMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiErrorResponse {
    error: OpenAiError,
}

#[derive(Debug, Deserialize)]
struct OpenAiError {
    message: String,
}
