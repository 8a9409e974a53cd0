//! Error types for db-ask.
//!
//! Defines the crate error enum and the reason codes reported to callers.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Main error type for db-ask operations.
#[derive(Error, Debug)]
pub enum AskError {
    /// Store unreachable, pool exhausted, or catalog introspection failed.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The store rejected a statement (unknown column, bad syntax, permissions).
    #[error("Query error: {0}")]
    Query(String),

    /// A stage exceeded its time budget.
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Generation service errors (rate limits, auth, malformed responses).
    #[error("LLM error: {0}")]
    Llm(String),

    /// Configuration errors (invalid config file, missing required fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal errors (unexpected states, bugs, etc.)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AskError {
    /// Creates a connection error with the given message.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Creates a query error with the given message.
    pub fn query(msg: impl Into<String>) -> Self {
        Self::Query(msg.into())
    }

    /// Creates a timeout error with the given message.
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    /// Creates an LLM error with the given message.
    pub fn llm(msg: impl Into<String>) -> Self {
        Self::Llm(msg.into())
    }

    /// Creates a configuration error with the given message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates an internal error with the given message.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Returns the error category as a string for display purposes.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Connection(_) => "Connection Error",
            Self::Query(_) => "Query Error",
            Self::Timeout(_) => "Timeout",
            Self::Llm(_) => "LLM Error",
            Self::Config(_) => "Configuration Error",
            Self::Internal(_) => "Internal Error",
        }
    }

    /// Returns the caller-facing reason code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Connection(_) => ErrorCode::ConnectivityError,
            Self::Query(_) => ErrorCode::StoreSyntaxError,
            Self::Timeout(_) => ErrorCode::TimeoutError,
            Self::Llm(_) => ErrorCode::GenerationError,
            Self::Config(_) => ErrorCode::InvalidRequest,
            Self::Internal(_) => ErrorCode::InternalError,
        }
    }

    /// Returns the bare message without the category prefix.
    pub fn message(&self) -> &str {
        match self {
            Self::Connection(m)
            | Self::Query(m)
            | Self::Timeout(m)
            | Self::Llm(m)
            | Self::Config(m)
            | Self::Internal(m) => m,
        }
    }
}

/// Result type alias using AskError.
pub type Result<T> = std::result::Result<T, AskError>;

/// Reason code attached to every failed request.
///
/// Codes are distinct so a front end can render targeted guidance: a model
/// refusal, a multi-statement rejection and a verb-level policy violation all
/// stem from the read-only policy but read differently to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    ConnectivityError,
    ModelRefusal,
    PolicyViolation,
    MultiStatementRejected,
    StoreSyntaxError,
    TimeoutError,
    UnanswerableQuestion,
    GenerationError,
    InvalidRequest,
    Cancelled,
    InternalError,
}

impl ErrorCode {
    /// Returns the code as it appears on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ConnectivityError => "ConnectivityError",
            Self::ModelRefusal => "ModelRefusal",
            Self::PolicyViolation => "PolicyViolation",
            Self::MultiStatementRejected => "MultiStatementRejected",
            Self::StoreSyntaxError => "StoreSyntaxError",
            Self::TimeoutError => "TimeoutError",
            Self::UnanswerableQuestion => "UnanswerableQuestion",
            Self::GenerationError => "GenerationError",
            Self::InvalidRequest => "InvalidRequest",
            Self::Cancelled => "Cancelled",
            Self::InternalError => "InternalError",
        }
    }

    /// Returns true if re-issuing the same request may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::ConnectivityError | Self::TimeoutError | Self::GenerationError
        )
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
