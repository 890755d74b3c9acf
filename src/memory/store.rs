//! Chat history storage
//!
//! Stores session messages in arrival order under a cumulative character
//! budget.

use crate::models::Document;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Messages always kept regardless of budget.
const MIN_RETAINED_MESSAGES: usize = 2;

/// Role of a message sender
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

impl ChatRole {
    pub fn label(&self) -> &'static str {
        match self {
            ChatRole::User => "User",
            ChatRole::Assistant => "Assistant",
        }
    }
}

/// A single message in a chat session
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(ChatRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(ChatRole::Assistant, content)
    }

    fn chars(&self) -> usize {
        self.content.chars().count()
    }
}

/// Ordered history bounded by total characters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatHistory {
    messages: VecDeque<ChatMessage>,
    total_chars: usize,
    max_chars: usize,
}

impl ChatHistory {
    pub fn new(max_chars: usize) -> Self {
        Self {
            messages: VecDeque::new(),
            total_chars: 0,
            max_chars,
        }
    }

    /// Append, then evict oldest messages while over budget. The last two
    /// messages are never evicted.
    pub fn push(&mut self, message: ChatMessage) {
        self.total_chars += message.chars();
        self.messages.push_back(message);

        while self.total_chars > self.max_chars && self.messages.len() > MIN_RETAINED_MESSAGES {
            if let Some(evicted) = self.messages.pop_front() {
                self.total_chars -= evicted.chars();
            }
        }
    }

    pub fn messages(&self) -> impl Iterator<Item = &ChatMessage> {
        self.messages.iter()
    }

    pub fn to_vec(&self) -> Vec<ChatMessage> {
        self.messages.iter().cloned().collect()
    }

    pub fn total_chars(&self) -> usize {
        self.total_chars
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// A chat session: the token under discussion, its cached docs and history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSession {
    pub id: String,
    pub token: String,
    pub docs: Vec<Document>,
    pub history: ChatHistory,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ChatSession {
    pub fn new(id: String, token: &str, docs: Vec<Document>, max_history_chars: usize) -> Self {
        let now = Utc::now();
        Self {
            id,
            token: token.trim().to_uppercase(),
            docs,
            history: ChatHistory::new(max_history_chars),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
