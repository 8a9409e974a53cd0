//! LLM integration for db-ask.
//!
//! Provides the generation-service trait, provider adapters, prompt
//! construction and response parsing.

pub mod factory;
pub mod mock;
pub mod ollama;
pub mod openai;
pub mod parser;
pub mod prompt;
pub mod types;

pub use factory::create_client;
pub use mock::MockLlmClient;
pub use ollama::{OllamaClient, OllamaConfig};
pub use openai::{OpenAiClient, OpenAiConfig};
pub use parser::{parse_llm_response, CandidateQuery, ParsedResponse};
pub use prompt::{TranslationRequest, TranslationRequestBuilder};
pub use types::{ConversationTurn, ConversationWindow, Message, Role};

use async_trait::async_trait;
use std::str::FromStr;

use crate::error::Result;

/// Trait for LLM clients that can generate completions.
///
/// Implementations must be thread-safe (Send + Sync) to support async operations.
/// Retrying transient provider failures is the implementation's concern.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Sends the system instructions and messages to `model`.
    ///
    /// Returns the complete response text. The text may be a sentinel such
    /// as `READ_ONLY_ERROR` rather than SQL.
    async fn complete(&self, model: &str, system: &str, messages: &[Message]) -> Result<String>;
}

/// LLM provider type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LlmProvider {
    /// OpenAI chat completions, or a compatible gateway.
    #[default]
    OpenAi,
    /// Local Ollama instance
    Ollama,
    /// Mock client for testing (no API key required)
    Mock,
}

impl LlmProvider {
    /// Returns the provider as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Ollama => "ollama",
            Self::Mock => "mock",
        }
    }
}

impl FromStr for LlmProvider {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "ollama" => Ok(Self::Ollama),
            "mock" => Ok(Self::Mock),
            _ => Err(format!("Unknown LLM provider: {}", s)),
        }
    }
}

impl std::fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
