//! Prompt construction for LLM requests.
//!
//! Builds the translation request: system instructions with the schema and
//! read-only rules, the bounded history window, and the question.

use crate::db::{SchemaSnapshot, SqlDialect};
use crate::llm::types::{ConversationTurn, ConversationWindow, Message, DEFAULT_WINDOW_TURNS};
use crate::safety::{DENIED_KEYWORDS, INVALID_QUERY_SENTINEL, REFUSAL_SENTINEL};

/// System prompt template for the SQL generator.
const SYSTEM_PROMPT_TEMPLATE: &str = r#"You are a SQL expert. Given a database schema and a user's question, generate one valid {dialect} query.

DATABASE SCHEMA (compact format, metadata only, not SQL syntax):
Format: table_name[column_count]{field_names}:
  column_name, data_type, nullable, max_length

{schema}

RULES:
1. Output ONLY the SQL query. No explanations, no markdown.
2. Use {dialect} syntax. Limit rows with LIMIT n, never TOP.
3. {quoting}
4. Use the EXACT table and column names from the schema above.
5. For aggregations, use appropriate GROUP BY clauses. Use proper JOIN syntax.
6. Always match text case-insensitively, e.g. LOWER(column) = LOWER('value') or LOWER(column) LIKE LOWER('%value%').
7. When a filter value is optional or may be missing, write it with COALESCE so a NULL value matches every row, e.g. WHERE category = COALESCE(NULL, category).
8. If the question cannot be answered from this schema, return exactly {invalid}
9. READ-ONLY ACCESS ONLY:
   - Generate a single SELECT statement and nothing else.
   - NEVER use any of: {forbidden}
   - If the user asks to delete, update, insert, create, drop or otherwise change data or structure, return exactly {refusal}

EXAMPLES:
- "Show me all brands" -> SELECT * FROM brands LIMIT 100
- "How many products are there?" -> SELECT COUNT(*) AS product_count FROM products
- "Find brands named sas" -> SELECT * FROM brands WHERE LOWER(name) = LOWER('sas')
- "Delete all brands" -> {refusal}
- "Update product prices" -> {refusal}
- "Drop table brands" -> {refusal}
- "What is the weather tomorrow?" -> {invalid}"#;

/// Everything sent to the generation service for one question.
///
/// Built once per request and never modified.
#[derive(Debug, Clone)]
pub struct TranslationRequest {
    schema: SchemaSnapshot,
    window: ConversationWindow,
    question: String,
    model: String,
    system_prompt: String,
}

impl TranslationRequest {
    pub fn schema(&self) -> &SchemaSnapshot {
        &self.schema
    }

    pub fn window(&self) -> &ConversationWindow {
        &self.window
    }

    pub fn question(&self) -> &str {
        &self.question
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Rendered system instructions.
    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// History turns oldest first, then the question.
    pub fn messages(&self) -> Vec<Message> {
        let mut messages = self.window.to_messages();
        messages.push(Message::user(self.question.clone()));
        messages
    }

    /// System instructions followed by [`messages`](Self::messages).
    pub fn full_messages(&self) -> Vec<Message> {
        let mut messages = Vec::with_capacity(self.window.len() + 2);
        messages.push(Message::system(self.system_prompt.clone()));
        messages.extend(self.messages());
        messages
    }
}

/// Composes [`TranslationRequest`]s for one store dialect.
#[derive(Debug, Clone)]
pub struct TranslationRequestBuilder {
    dialect: SqlDialect,
    history_turns: usize,
    schema_budget: Option<usize>,
}

impl TranslationRequestBuilder {
    /// Creates a builder keeping the default five history turns and the full schema.
    pub fn new(dialect: SqlDialect) -> Self {
        Self {
            dialect,
            history_turns: DEFAULT_WINDOW_TURNS,
            schema_budget: None,
        }
    }

    /// Sets the history window; values above five are clamped to five.
    pub fn with_history_turns(mut self, turns: usize) -> Self {
        self.history_turns = turns.min(DEFAULT_WINDOW_TURNS);
        self
    }

    /// Caps the schema text at roughly `budget` characters by dropping whole tables.
    pub fn with_schema_budget(mut self, budget: Option<usize>) -> Self {
        self.schema_budget = budget;
        self
    }

    /// Builds the request. History beyond the window is dropped, oldest first.
    pub fn build(
        &self,
        schema: SchemaSnapshot,
        history: &[ConversationTurn],
        question: &str,
        model: &str,
    ) -> TranslationRequest {
        let window = ConversationWindow::from_history(history, self.history_turns);
        let system_prompt = self.system_prompt(&schema);

        TranslationRequest {
            schema,
            window,
            question: question.trim().to_string(),
            model: model.to_string(),
            system_prompt,
        }
    }

    /// Renders the system instructions for a schema.
    pub fn system_prompt(&self, schema: &SchemaSnapshot) -> String {
        let schema_text = if schema.is_empty() {
            "(no tables)".to_string()
        } else {
            schema.format_for_llm(self.schema_budget)
        };

        SYSTEM_PROMPT_TEMPLATE
            .replace("{dialect}", self.dialect.name())
            .replace("{quoting}", self.dialect.quoting_hint())
            .replace("{forbidden}", &forbidden_verbs())
            .replace("{refusal}", REFUSAL_SENTINEL)
            .replace("{invalid}", INVALID_QUERY_SENTINEL)
            .replace("{schema}", &schema_text)
    }
}

fn forbidden_verbs() -> String {
    let mut verbs: Vec<&str> = DENIED_KEYWORDS.to_vec();
    verbs.extend(["BULK INSERT", "SP_*", "XP_*"]);
    verbs.join(", ")
}
