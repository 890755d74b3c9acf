//! Conversation memory
//!
//! Bounded per-session chat history. Sessions themselves live in
//! [`crate::state`].

pub mod store;

pub use store::{ChatHistory, ChatMessage, ChatRole, ChatSession};

/// Default cumulative character budget of a session history.
pub const DEFAULT_MAX_HISTORY_CHARS: usize = 6000;
