//! LLM client factory.
//!
//! Centralizes provider-specific logic for creating LLM clients.

use std::sync::Arc;

use crate::config::LlmConfig;
use crate::error::{AskError, Result};
use crate::llm::{
    LlmClient, LlmProvider, MockLlmClient, OllamaClient, OllamaConfig, OpenAiClient, OpenAiConfig,
};

/// Creates an LLM client from configuration.
///
/// The OpenAI key comes from `api_key` when given, else from
/// `OPENAI_API_KEY`. `base_url` overrides the provider endpoint; without it
/// `OPENAI_BASE_URL` or `OLLAMA_URL` is consulted.
pub fn create_client(config: &LlmConfig, api_key: Option<String>) -> Result<Arc<dyn LlmClient>> {
    let provider: LlmProvider = config.provider.parse().map_err(AskError::config)?;

    match provider {
        LlmProvider::OpenAi => {
            let key = api_key
                .or_else(|| std::env::var("OPENAI_API_KEY").ok())
                .ok_or_else(|| {
                    AskError::config("No API key configured. Set OPENAI_API_KEY.")
                })?;

            let mut openai = OpenAiConfig::new(key)
                .with_timeout(config.timeout_secs)
                .with_max_attempts(config.max_attempts);
            if let Some(url) = config
                .base_url
                .clone()
                .or_else(|| std::env::var("OPENAI_BASE_URL").ok())
            {
                openai = openai.with_base_url(url);
            }
            Ok(Arc::new(OpenAiClient::new(openai)?))
        }
        LlmProvider::Ollama => {
            let mut ollama = OllamaConfig::new()
                .with_timeout(config.timeout_secs)
                .with_max_attempts(config.max_attempts);
            if let Some(url) = config
                .base_url
                .clone()
                .or_else(|| std::env::var("OLLAMA_URL").ok())
            {
                ollama = ollama.with_url(url);
            }
            Ok(Arc::new(OllamaClient::new(ollama)?))
        }
        LlmProvider::Mock => Ok(Arc::new(MockLlmClient::new())),
    }
}
