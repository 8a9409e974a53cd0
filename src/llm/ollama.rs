//! Ollama LLM client implementation.
//!
//! Implements the LlmClient trait for local Ollama instances.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{AskError, Result};
use crate::llm::types::Message;
use crate::llm::LlmClient;

/// Default timeout for API requests. Local models on CPU are slow.
const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Default Ollama API URL.
const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

/// Default number of attempts for transient errors.
const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Base delay for exponential backoff (milliseconds).
const RETRY_BASE_DELAY_MS: u64 = 500;

/// Ollama client configuration.
#[derive(Debug, Clone)]
pub struct OllamaConfig {
    /// Base URL for the Ollama API.
    pub base_url: String,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
    /// Attempts per call, including the first.
    pub max_attempts: u32,
}

impl OllamaConfig {
    /// Creates a config for the local default endpoint.
    pub fn new() -> Self {
        Self {
            base_url: DEFAULT_OLLAMA_URL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    /// Sets the base URL.
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
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

impl Default for OllamaConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Ollama LLM client.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    config: OllamaConfig,
    client: Client,
}

impl OllamaClient {
    /// Creates a new Ollama client with the given configuration.
    pub fn new(config: OllamaConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AskError::llm(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    /// Creates a client from environment variables.
    ///
    /// Reads `OLLAMA_URL` for the base URL (defaults to http://localhost:11434).
    pub fn from_env() -> Result<Self> {
        let base_url =
            std::env::var("OLLAMA_URL").unwrap_or_else(|_| DEFAULT_OLLAMA_URL.to_string());
        Self::new(OllamaConfig::new().with_url(base_url))
    }

    /// Converts internal messages to Ollama API format, system prompt first.
    fn convert_messages(system: &str, messages: &[Message]) -> Vec<OllamaMessage> {
        std::iter::once(OllamaMessage {
            role: "system".to_string(),
            content: system.to_string(),
        })
        .chain(messages.iter().map(|m| OllamaMessage {
            role: m.role.as_str().to_string(),
            content: m.content.clone(),
        }))
        .collect()
    }

    /// Returns the chat API endpoint URL.
    fn chat_url(&self) -> String {
        format!("{}/api/chat", self.config.base_url.trim_end_matches('/'))
    }

    fn map_request_error(error: &reqwest::Error) -> AskError {
        if error.is_timeout() {
            AskError::timeout("Generation request timed out")
        } else if error.is_connect() {
            AskError::llm("Failed to connect to Ollama. Is it running? Try: ollama serve")
        } else {
            AskError::llm(format!("Request failed: {}", error))
        }
    }
}

#[async_trait]
impl LlmClient for OllamaClient {
    async fn complete(&self, model: &str, system: &str, messages: &[Message]) -> Result<String> {
        let request = OllamaRequest {
            model: model.to_string(),
            messages: Self::convert_messages(system, messages),
            stream: false,
            options: OllamaOptions {
                temperature: 0.3,
                num_predict: 400,
            },
        };

        let url = self.chat_url();
        let attempts = self.config.max_attempts.max(1);
        let mut last_error = AskError::llm("No request was sent");
        let mut delay = Duration::from_millis(RETRY_BASE_DELAY_MS);

        for attempt in 1..=attempts {
            debug!(model, attempt, attempts, "Ollama request");

            let is_retryable = match self.client.post(&url).json(&request).send().await {
                Ok(response) => {
                    let status = response.status();
                    let body = response
                        .text()
                        .await
                        .map_err(|e| AskError::llm(format!("Failed to read response: {}", e)))?;

                    if status.is_success() {
                        let response: OllamaResponse = serde_json::from_str(&body)
                            .map_err(|e| AskError::llm(format!("Failed to parse response: {}", e)))?;
                        return Ok(response.message.content.trim().to_string());
                    }

                    last_error = AskError::llm(format!("Ollama API error ({}): {}", status, body));
                    status.is_server_error()
                }
                Err(e) => {
                    last_error = Self::map_request_error(&e);
                    e.is_connect()
                }
            };

            if !is_retryable || attempt >= attempts {
                break;
            }

            warn!(attempt, error = %last_error, "Ollama request failed, retrying");
            tokio::time::sleep(delay).await;
            delay *= 2;
        }

        Err(last_error)
    }
}

// Ollama API types

#[derive(Debug, Serialize)]
struct OllamaRequest {
    model: String,
    messages: Vec<OllamaMessage>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct OllamaMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    message: OllamaMessage,
}
