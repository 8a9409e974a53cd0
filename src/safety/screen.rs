//! Question screening before generation.
//!
//! Questions that plainly ask for a write, and chatter that is not a
//! question about data, are answered without a generation call. Matching is
//! on whole words, so `updated_at` or `address` never trip it.

use tracing::debug;

use super::lexer;
use super::RejectionReason;

/// Verbs that ask the database to change.
const WRITE_VERBS: &[&str] = &[
    "delete", "remove", "erase", "truncate", "drop", "destroy", "insert", "create", "update",
    "modify", "edit", "alter", "grant", "revoke", "backup", "restore", "execute", "exec",
];

/// Words that turn a following write verb into a question about data,
/// as in "show deleted orders" or "how many were removed".
const READ_CONTEXT: &[&str] = &[
    "show", "list", "display", "find", "get", "view", "see", "count", "how", "what", "which",
    "where", "give", "tell", "who", "when",
];

/// Words that mark a short input as a data question.
const DATA_WORDS: &[&str] = &[
    "show", "list", "get", "find", "select", "count", "many", "what", "which", "where", "who",
    "when", "display", "fetch", "retrieve", "query", "search", "filter", "sort", "order",
    "group", "sum", "average", "avg", "max", "min", "all", "top", "bottom", "first", "last",
    "user", "customer", "product", "data", "table", "record", "row", "column", "brand",
    "category", "stock", "sale", "total",
];

/// Whole inputs that are conversation, not questions.
const CHATTER: &[&str] = &[
    "hello", "hi", "hey", "thanks", "thank you", "bye", "goodbye", "gg", "lol", "haha", "ok",
    "okay", "yes", "no", "maybe",
];

/// Rejects a question before any schema or generation work.
///
/// Returns `ModelRefusal` for a write request and `Unanswerable` for input
/// that is not a data question.
pub fn screen_question(question: &str) -> Option<RejectionReason> {
    let lowered = question.trim().to_lowercase();
    let words: Vec<&str> = lexer::words_in(&lowered).collect();

    if let Some(verb) = write_intent(&words) {
        debug!(verb, "Question asks for a write");
        return Some(RejectionReason::ModelRefusal);
    }

    if !looks_like_data_question(&lowered, &words) {
        return Some(RejectionReason::Unanswerable);
    }
    None
}

/// First write verb not preceded by a read-context word.
fn write_intent<'a>(words: &[&'a str]) -> Option<&'a str> {
    let mut read_context = false;
    for word in words {
        if READ_CONTEXT.contains(word) {
            read_context = true;
        } else if !read_context && WRITE_VERBS.contains(word) {
            return Some(*word);
        }
    }
    None
}

fn looks_like_data_question(lowered: &str, words: &[&str]) -> bool {
    let text = lowered.trim_end_matches(['!', '?', '.', ' ']);
    if text.chars().count() < 3 || CHATTER.contains(&text) {
        return false;
    }

    let has_data_word = words.iter().any(|word| {
        DATA_WORDS.contains(word)
            || word
                .strip_suffix('s')
                .is_some_and(|singular| DATA_WORDS.contains(&singular))
    });
    has_data_word || text.chars().count() >= 10
}
