//! Read-only query policy.
//!
//! Classifies candidate SQL from the generation service as accepted or
//! rejected. Classification is token based: comments are stripped, the text
//! is split into words and literals, and the result is checked for a single
//! statement that starts with SELECT and names no write or administrative
//! verb. The comment-free text that was checked is the only text that may be
//! executed; `AcceptedQuery` carries it to the executor.

mod lexer;
mod screen;
mod validator;

pub use lexer::{strip_comments, tokenize, LexError, LiteralKind, Token};
pub use screen::screen_question;
pub use validator::{validate_sql, QueryValidator, DENIED_KEYWORDS};

use crate::error::ErrorCode;
use serde::Serialize;
use std::fmt;

/// Literal the generation service returns when it declines a write request.
pub const REFUSAL_SENTINEL: &str = "READ_ONLY_ERROR";

/// Literal the generation service returns when the schema cannot answer the question.
pub const INVALID_QUERY_SENTINEL: &str = "INVALID_QUERY";

/// Why a candidate was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "code")]
pub enum RejectionReason {
    /// The generation service returned the refusal sentinel.
    ModelRefusal,
    /// The generation service could not map the question onto the schema.
    #[serde(rename = "UnanswerableQuestion")]
    Unanswerable,
    /// More than one statement.
    #[serde(rename = "MultiStatementRejected")]
    MultiStatement,
    /// Not a SELECT, names a denied verb, or cannot be scanned.
    ///
    /// `reason` is `not-select`, `unterminated-literal`,
    /// `ambiguous-literal`, or the offending verb in upper case.
    PolicyViolation { reason: String },
}

impl RejectionReason {
    fn policy(reason: impl Into<String>) -> Self {
        Self::PolicyViolation {
            reason: reason.into(),
        }
    }

    /// Caller-facing reason code.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::ModelRefusal => ErrorCode::ModelRefusal,
            Self::Unanswerable => ErrorCode::UnanswerableQuestion,
            Self::MultiStatement => ErrorCode::MultiStatementRejected,
            Self::PolicyViolation { .. } => ErrorCode::PolicyViolation,
        }
    }

    /// Fixed message shown to the user.
    pub fn user_message(&self) -> String {
        match self {
            Self::ModelRefusal => "This request would change the database. You have read-only \
                 access, so only questions that read data can be answered."
                .to_string(),
            Self::Unanswerable => "This question cannot be answered from the available tables. \
                 Try rephrasing it using the names of things in the database."
                .to_string(),
            Self::MultiStatement => "Multiple statements are not allowed. You have read-only \
                 access to the database."
                .to_string(),
            Self::PolicyViolation { reason } => match reason.as_str() {
                "not-select" => "Only SELECT queries are allowed. You have read-only access \
                     to the database."
                    .to_string(),
                "unterminated-literal" => "The generated query has an unterminated quoted \
                     value and cannot be checked. Please rephrase the question."
                    .to_string(),
                "ambiguous-literal" => "The generated query uses a quoting style that cannot \
                     be checked safely. Please rephrase the question."
                    .to_string(),
                verb => format!(
                    "Write operations like '{verb}' are not allowed. You have read-only access \
                     to the database."
                ),
            },
        }
    }
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PolicyViolation { reason } => write!(f, "{} ({reason})", self.code()),
            _ => write!(f, "{}", self.code()),
        }
    }
}

/// SQL that passed validation, in the exact form that was checked.
///
/// Only the validator constructs this type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptedQuery {
    sql: String,
}

impl AcceptedQuery {
    /// The normalized statement text.
    pub fn as_str(&self) -> &str {
        &self.sql
    }
}

impl fmt::Display for AcceptedQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql)
    }
}

/// Outcome of validating one candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationVerdict {
    accepted: bool,
    reason: Option<RejectionReason>,
    normalized_text: String,
}

impl ValidationVerdict {
    fn accept(normalized_text: String) -> Self {
        Self {
            accepted: true,
            reason: None,
            normalized_text,
        }
    }

    fn reject(reason: RejectionReason, normalized_text: String) -> Self {
        Self {
            accepted: false,
            reason: Some(reason),
            normalized_text,
        }
    }

    pub fn is_accepted(&self) -> bool {
        self.accepted
    }

    /// Rejection reason, None when accepted.
    pub fn reason(&self) -> Option<&RejectionReason> {
        self.reason.as_ref()
    }

    /// Reason code, None when accepted.
    pub fn reason_code(&self) -> Option<ErrorCode> {
        self.reason.as_ref().map(RejectionReason::code)
    }

    /// Comment-free, trimmed text without trailing terminators.
    pub fn normalized_text(&self) -> &str {
        &self.normalized_text
    }

    /// Converts into the executable query, or the rejection reason.
    pub fn into_result(self) -> Result<AcceptedQuery, RejectionReason> {
        match self.reason {
            None => Ok(AcceptedQuery {
                sql: self.normalized_text,
            }),
            Some(reason) => Err(reason),
        }
    }
}
