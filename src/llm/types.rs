//! Message types for LLM communication.
//!
//! Defines the messages sent to generation services and the bounded
//! conversation window supplied by callers.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Number of prior turns kept for context, and the most a window may hold.
pub const DEFAULT_WINDOW_TURNS: usize = 5;

/// Role of a message in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System message providing context and instructions.
    System,
    /// User message (human input).
    User,
    /// Assistant message (LLM response).
    Assistant,
}

impl Role {
    /// Returns the role as a string for API requests.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// A single message in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// The role of the message sender.
    pub role: Role,
    /// The content of the message.
    pub content: String,
}

impl Message {
    /// Creates a new message with the given role and content.
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    /// Creates a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// Creates a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Creates an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// One prior turn of caller-supplied conversation history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub text: String,
}

impl ConversationTurn {
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, text)
    }
}

/// Caller history never speaks with system authority: a `system` turn is
/// passed on as a user message.
impl From<&ConversationTurn> for Message {
    fn from(turn: &ConversationTurn) -> Self {
        let role = match turn.role {
            Role::System => Role::User,
            role => role,
        };
        Message::new(role, turn.text.clone())
    }
}

/// The most recent turns of a conversation, oldest first.
///
/// Pushing past capacity evicts the oldest turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationWindow {
    turns: VecDeque<ConversationTurn>,
    capacity: usize,
}

impl Default for ConversationWindow {
    fn default() -> Self {
        Self::new()
    }
}

impl ConversationWindow {
    /// Creates an empty window holding [`DEFAULT_WINDOW_TURNS`] turns.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_WINDOW_TURNS)
    }

    /// Creates an empty window with a custom capacity, at most
    /// [`DEFAULT_WINDOW_TURNS`].
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.min(DEFAULT_WINDOW_TURNS);
        Self {
            turns: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Builds a window from full history, keeping only the newest turns.
    pub fn from_history(history: &[ConversationTurn], capacity: usize) -> Self {
        let mut window = Self::with_capacity(capacity);
        let skip = history.len().saturating_sub(capacity);
        for turn in &history[skip..] {
            window.push(turn.clone());
        }
        window
    }

    /// Appends a turn, evicting the oldest if full.
    pub fn push(&mut self, turn: ConversationTurn) {
        if self.capacity == 0 {
            return;
        }
        if self.turns.len() == self.capacity {
            self.turns.pop_front();
        }
        self.turns.push_back(turn);
    }

    pub fn turns(&self) -> impl Iterator<Item = &ConversationTurn> {
        self.turns.iter()
    }

    /// Window contents as service messages, oldest first.
    pub fn to_messages(&self) -> Vec<Message> {
        self.turns.iter().map(Message::from).collect()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}
