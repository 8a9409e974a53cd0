//! Candidate SQL classification.

use std::collections::HashSet;

use tracing::debug;

use super::lexer::{self, LexError, Token};
use super::{RejectionReason, ValidationVerdict, INVALID_QUERY_SENTINEL, REFUSAL_SENTINEL};

/// Keywords whose presence marks a statement as a write or administrative
/// operation. `SP_` and `XP_` are prefixes; `BULK INSERT` is two words.
pub const DENIED_KEYWORDS: &[&str] = &[
    "DELETE", "TRUNCATE", "DROP", "INSERT", "UPDATE", "ALTER", "CREATE", "EXEC", "EXECUTE",
    "GRANT", "REVOKE", "MERGE", "BACKUP", "RESTORE", "DBCC",
];

const DENIED_PREFIXES: &[&str] = &["SP_", "XP_"];

/// Validates candidate SQL against the read-only policy.
#[derive(Debug)]
pub struct QueryValidator {
    denied: HashSet<&'static str>,
}

impl Default for QueryValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryValidator {
    /// Creates a validator with the standard deny-list.
    pub fn new() -> Self {
        Self {
            denied: DENIED_KEYWORDS.iter().copied().collect(),
        }
    }

    /// Classifies one candidate.
    ///
    /// Checks run in a fixed order: sentinels, scannability, statement
    /// count, leading keyword, deny-list. The first failing check decides
    /// the reason.
    pub fn validate(&self, candidate: &str) -> ValidationVerdict {
        let trimmed = candidate.trim();
        if let Some(reason) = sentinel_reason(trimmed) {
            return ValidationVerdict::reject(reason, trimmed.to_string());
        }

        let normalized = match lexer::strip_comments(candidate) {
            Ok(stripped) => normalize(&stripped),
            Err(err) => return ValidationVerdict::reject(lex_reason(err), trimmed.to_string()),
        };

        if let Some(reason) = sentinel_reason(&normalized) {
            return ValidationVerdict::reject(reason, normalized);
        }

        let tokens = match lexer::tokenize(&normalized) {
            Ok(tokens) => tokens,
            Err(err) => return ValidationVerdict::reject(lex_reason(err), normalized),
        };

        let verdict = match self.classify(&tokens) {
            Some(reason) => ValidationVerdict::reject(reason, normalized),
            None => ValidationVerdict::accept(normalized),
        };

        debug!(
            accepted = verdict.is_accepted(),
            reason = ?verdict.reason(),
            "Validated candidate SQL"
        );
        verdict
    }

    fn classify(&self, tokens: &[Token]) -> Option<RejectionReason> {
        if tokens.iter().any(|t| matches!(t, Token::Semicolon)) {
            return Some(RejectionReason::MultiStatement);
        }

        let starts_with_select = tokens
            .first()
            .and_then(Token::as_word)
            .is_some_and(|w| w.eq_ignore_ascii_case("SELECT"));
        let denied = self.find_denied(tokens);
        if !starts_with_select {
            // cite the verb when there is one to cite
            return Some(RejectionReason::policy(
                denied.unwrap_or_else(|| "not-select".to_string()),
            ));
        }

        denied.map(RejectionReason::policy)
    }

    /// Scans words, including words inside literals, for denied verbs.
    fn find_denied(&self, tokens: &[Token]) -> Option<String> {
        let words: Vec<String> = tokens
            .iter()
            .flat_map(|token| match token {
                Token::Word(w) => vec![w.to_uppercase()],
                Token::Literal { content, .. } => {
                    lexer::words_in(content).map(str::to_uppercase).collect()
                }
                _ => Vec::new(),
            })
            .collect();

        for (i, word) in words.iter().enumerate() {
            if word == "BULK" && words.get(i + 1).is_some_and(|next| next == "INSERT") {
                return Some("BULK INSERT".to_string());
            }
            if self.denied.contains(word.as_str())
                || DENIED_PREFIXES.iter().any(|p| word.starts_with(p))
            {
                return Some(word.clone());
            }
        }
        None
    }
}

/// Validates with the standard deny-list.
pub fn validate_sql(candidate: &str) -> ValidationVerdict {
    QueryValidator::new().validate(candidate)
}

fn lex_reason(err: LexError) -> RejectionReason {
    match err {
        LexError::UnterminatedLiteral => RejectionReason::policy("unterminated-literal"),
        LexError::AmbiguousLiteral => RejectionReason::policy("ambiguous-literal"),
    }
}

fn sentinel_reason(text: &str) -> Option<RejectionReason> {
    if text == REFUSAL_SENTINEL {
        Some(RejectionReason::ModelRefusal)
    } else if text == INVALID_QUERY_SENTINEL {
        Some(RejectionReason::Unanswerable)
    } else {
        None
    }
}

/// Trims whitespace and trailing statement terminators.
fn normalize(stripped: &str) -> String {
    let mut text = stripped.trim();
    while let Some(rest) = text.strip_suffix(';') {
        text = rest.trim_end();
    }
    text.to_string()
}
