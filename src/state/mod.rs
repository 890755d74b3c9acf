//! Session persistence layer
//!
//! Responsible for storing chat sessions between requests.
//! Currently in-memory with idle expiry.

use crate::error::OrchestrationError;
use crate::memory::{ChatMessage, ChatRole, ChatSession, DEFAULT_MAX_HISTORY_CHARS};
use crate::models::Document;
use crate::Result;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(3600);

/// Trait for session persistence
///
/// Each call is atomic on its own. A multi-call sequence on one session is
/// not, so concurrent chat turns on the same id may interleave.
#[async_trait::async_trait]
pub trait SessionStore: Send + Sync {
    /// Create a session and return its id.
    async fn create(&self, token: &str, docs: Vec<Document>) -> Result<String>;
    async fn get(&self, session_id: &str) -> Result<Option<ChatSession>>;
    /// Replace cached docs. An empty list leaves the session untouched.
    async fn replace_docs(&self, session_id: &str, docs: Vec<Document>) -> Result<()>;
    async fn append(&self, session_id: &str, role: ChatRole, content: &str) -> Result<()>;
    async fn history(&self, session_id: &str) -> Result<Vec<ChatMessage>>;
    /// Drop expired sessions, returning how many were removed.
    async fn purge_expired(&self) -> Result<usize>;
}

/// In-memory session store
pub struct InMemorySessionStore {
    sessions: Arc<RwLock<HashMap<String, ChatSession>>>,
    ttl: Duration,
    max_history_chars: usize,
}

impl InMemorySessionStore {
    pub fn new(ttl: Duration, max_history_chars: usize) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            ttl,
            max_history_chars,
        }
    }

    fn is_expired(&self, session: &ChatSession) -> bool {
        Utc::now()
            .signed_duration_since(session.updated_at)
            .to_std()
            .map(|idle| idle > self.ttl)
            .unwrap_or(false)
    }

    fn not_found(session_id: &str) -> OrchestrationError {
        OrchestrationError::NotFound(format!("Unknown session_id '{}'", session_id))
    }

    /// Run `f` on a live session, purging it first if it has expired.
    async fn with_session<T>(
        &self,
        session_id: &str,
        f: impl FnOnce(&mut ChatSession) -> T,
    ) -> Result<T> {
        let mut sessions = self.sessions.write().await;

        let expired = match sessions.get(session_id) {
            Some(session) => self.is_expired(session),
            None => return Err(Self::not_found(session_id)),
        };
        if expired {
            sessions.remove(session_id);
            debug!(session_id, "Session expired");
            return Err(Self::not_found(session_id));
        }

        sessions
            .get_mut(session_id)
            .map(f)
            .ok_or_else(|| Self::not_found(session_id))
    }
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new(DEFAULT_SESSION_TTL, DEFAULT_MAX_HISTORY_CHARS)
    }
}

#[async_trait::async_trait]
impl SessionStore for InMemorySessionStore {
    async fn create(&self, token: &str, docs: Vec<Document>) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        let session = ChatSession::new(id.clone(), token, docs, self.max_history_chars);

        let mut sessions = self.sessions.write().await;
        sessions.insert(id.clone(), session);

        debug!(session_id = %id, "Session created");
        Ok(id)
    }

    async fn get(&self, session_id: &str) -> Result<Option<ChatSession>> {
        match self.with_session(session_id, |s| s.clone()).await {
            Ok(session) => Ok(Some(session)),
            Err(OrchestrationError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn replace_docs(&self, session_id: &str, docs: Vec<Document>) -> Result<()> {
        if docs.is_empty() {
            return Ok(());
        }
        self.with_session(session_id, |session| {
            session.docs = docs;
            session.touch();
        })
        .await
    }

    async fn append(&self, session_id: &str, role: ChatRole, content: &str) -> Result<()> {
        self.with_session(session_id, |session| {
            session.history.push(ChatMessage::new(role, content));
            session.touch();
        })
        .await
    }

    async fn history(&self, session_id: &str) -> Result<Vec<ChatMessage>> {
        self.with_session(session_id, |session| session.history.to_vec())
            .await
    }

    async fn purge_expired(&self) -> Result<usize> {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, session| !self.is_expired(session));
        Ok(before - sessions.len())
    }
}
