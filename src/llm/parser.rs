//! Response parsing for LLM outputs.
//!
//! Extracts SQL from LLM responses that may contain markdown code blocks.

use std::fmt;

/// Result of parsing an LLM response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedResponse {
    /// Any explanatory text before or after the SQL.
    pub text: String,
    /// Extracted SQL query, if found.
    pub sql: Option<String>,
}

impl ParsedResponse {
    /// Creates a new parsed response with only text (no SQL).
    pub fn text_only(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            sql: None,
        }
    }

    /// Creates a new parsed response with SQL and optional text.
    pub fn with_sql(text: impl Into<String>, sql: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            sql: Some(sql.into()),
        }
    }
}

/// Raw generation output plus the SQL text taken from it.
///
/// The SQL is the first fenced code block when there is one, otherwise the
/// whole trimmed response. Nothing else is rewritten.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateQuery {
    raw: String,
    sql: String,
}

impl CandidateQuery {
    pub fn from_response(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let sql = match parse_llm_response(&raw).sql {
            Some(sql) => sql,
            None => raw.trim().to_string(),
        };
        Self { raw, sql }
    }

    /// The full service response.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Text handed to the validator.
    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn is_empty(&self) -> bool {
        self.sql.is_empty()
    }
}

impl fmt::Display for CandidateQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql)
    }
}

/// Parses an LLM response to extract SQL from markdown code blocks.
///
/// Looks for SQL in the following formats:
/// - ```sql ... ```
/// - ``` ... ``` (no language specified)
///
/// If multiple code blocks are found, uses the first one.
/// If no code block is found, returns the full text with no SQL.
pub fn parse_llm_response(response: &str) -> ParsedResponse {
    for lang in ["sql", "SQL", ""] {
        if let Some(sql) = extract_code_block(response, lang) {
            let text = remove_code_block(response, lang);
            return ParsedResponse::with_sql(text.trim(), sql.trim());
        }
    }

    ParsedResponse::text_only(response.trim())
}

/// Locates the first block fenced with ```` ```lang ````.
///
/// Returns (fence start, content start, content end). An empty `lang`
/// matches only fences with no language tag.
fn find_code_block(text: &str, lang: &str) -> Option<(usize, usize, usize)> {
    let start_pattern = format!("```{lang}");
    let start_idx = text.find(&start_pattern)?;

    let content_start = text[start_idx + start_pattern.len()..]
        .find('\n')
        .map(|i| start_idx + start_pattern.len() + i + 1)?;

    // anything between the fence and the newline is a language tag
    let tag = &text[start_idx + start_pattern.len()..content_start - 1];
    if !tag.trim().is_empty() {
        return None;
    }

    let end_offset = text[content_start..].find("```")?;
    Some((start_idx, content_start, content_start + end_offset))
}

fn extract_code_block(text: &str, lang: &str) -> Option<String> {
    let (_, start, end) = find_code_block(text, lang)?;
    Some(text[start..end].to_string())
}

/// Removes the first code block from the text, returning the remaining text.
fn remove_code_block(text: &str, lang: &str) -> String {
    let Some((fence_start, _, content_end)) = find_code_block(text, lang) else {
        return text.to_string();
    };

    let before = &text[..fence_start];
    let after = &text[content_end + 3..];
    format!("{}{}", before.trim_end(), after.trim_start())
}
