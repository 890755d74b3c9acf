//! Conversational interaction handler
//!
//! Multi-turn Q&A over a fixed set of documents. The session keeps the docs
//! and a bounded history so follow-up questions can build on earlier turns.

use crate::analysis::{AnswerBudget, ReasoningAgent};
use crate::error::OrchestrationError;
use crate::memory::{ChatMessage, ChatRole};
use crate::models::{Document, Source};
use crate::state::SessionStore;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// One chat turn from the client
#[derive(Debug, Clone, Deserialize)]
pub struct ChatTurn {
    pub token: String,
    pub message: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub docs: Option<Vec<Document>>,
    #[serde(default)]
    pub token_budget_tokens: Option<usize>,
    #[serde(default)]
    pub model_answer_tokens: Option<usize>,
}

/// Response for a chat turn
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatReply {
    pub session_id: String,
    pub token: String,
    pub answer: String,
    pub sources: Vec<Source>,
    pub history: Vec<ChatMessage>,
}

pub struct ChatService {
    store: Arc<dyn SessionStore>,
    reasoner: Arc<ReasoningAgent>,
}

impl ChatService {
    pub fn new(store: Arc<dyn SessionStore>, reasoner: Arc<ReasoningAgent>) -> Self {
        Self { store, reasoner }
    }

    pub async fn handle(&self, turn: ChatTurn) -> Result<ChatReply> {
        if turn.message.trim().is_empty() {
            return Err(OrchestrationError::ValidationError(
                "message must not be empty".to_string(),
            ));
        }

        let request_docs = turn.docs.unwrap_or_default();

        let (session_id, docs) = match turn.session_id.filter(|id| !id.trim().is_empty()) {
            Some(session_id) => {
                let session = self.store.get(&session_id).await?.ok_or_else(|| {
                    OrchestrationError::NotFound(
                        "Unknown session_id. Start a new session first.".to_string(),
                    )
                })?;

                let docs = if request_docs.is_empty() {
                    session.docs
                } else {
                    self.store
                        .replace_docs(&session_id, request_docs.clone())
                        .await?;
                    request_docs
                };
                if docs.is_empty() {
                    return Err(OrchestrationError::ValidationError(
                        "Attach docs to continue this session.".to_string(),
                    ));
                }
                (session_id, docs)
            }
            None => {
                if request_docs.is_empty() {
                    return Err(OrchestrationError::ValidationError(
                        "Docs are required to start a chat session.".to_string(),
                    ));
                }
                let session_id = self.store.create(&turn.token, request_docs.clone()).await?;
                (session_id, request_docs)
            }
        };

        info!(session_id = %session_id, docs = docs.len(), "Chat turn");

        self.store
            .append(&session_id, ChatRole::User, &turn.message)
            .await?;
        let history = self.store.history(&session_id).await?;

        let defaults = self.reasoner.default_budget();
        let budget = AnswerBudget {
            total_tokens: turn.token_budget_tokens.unwrap_or(defaults.total_tokens),
            answer_tokens: turn.model_answer_tokens.unwrap_or(defaults.answer_tokens),
        };
        let answer = self.reasoner.chat(&docs, &history, budget).await;

        self.store
            .append(&session_id, ChatRole::Assistant, &answer.answer)
            .await?;
        let history = self.store.history(&session_id).await?;

        Ok(ChatReply {
            session_id,
            token: turn.token.trim().to_uppercase(),
            answer: answer.answer,
            sources: answer.sources,
            history,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::InMemorySessionStore;
    use crate::testing::ScriptedReasoner;
    use tokio_test::assert_err;

    fn service(replies: Vec<&str>) -> ChatService {
        let llm = Arc::new(ScriptedReasoner::new(
            replies.into_iter().map(|r| Ok(r.to_string())).collect(),
        ));
        ChatService::new(
            Arc::new(InMemorySessionStore::default()),
            Arc::new(ReasoningAgent::new(llm)),
        )
    }

    fn turn(message: &str, session_id: Option<String>, docs: Option<Vec<Document>>) -> ChatTurn {
        ChatTurn {
            token: "eth".to_string(),
            message: message.to_string(),
            session_id,
            docs,
            token_budget_tokens: None,
            model_answer_tokens: None,
        }
    }

    fn docs() -> Vec<Document> {
        vec![Document::new("Staking deposits rose 4% week over week.").with_id("eth-1")]
    }

    #[tokio::test]
    async fn test_new_session_then_follow_up() {
        let chat = service(vec!["Deposits rose [1].", "Still rising [1]."]);

        let first = chat
            .handle(turn("What is happening with staking?", None, Some(docs())))
            .await
            .unwrap();
        assert_eq!(first.token, "ETH");
        assert_eq!(first.answer, "Deposits rose [1].");
        assert_eq!(first.sources[0].id, "eth-1");
        assert_eq!(first.history.len(), 2);

        let second = chat
            .handle(turn("And now?", Some(first.session_id.clone()), None))
            .await
            .unwrap();
        assert_eq!(second.session_id, first.session_id);
        assert_eq!(second.history.len(), 4);
        assert_eq!(second.history[3], ChatMessage::assistant("Still rising [1]."));
    }

    #[tokio::test]
    async fn test_new_session_requires_docs() {
        let chat = service(vec![]);
        let err = assert_err!(chat.handle(turn("hi", None, None)).await);
        assert!(matches!(err, OrchestrationError::ValidationError(_)));
    }

    #[tokio::test]
    async fn test_unknown_session_is_not_found() {
        let chat = service(vec![]);
        let err = assert_err!(
            chat.handle(turn("hi", Some("nope".into()), Some(docs())))
                .await
        );
        assert!(matches!(err, OrchestrationError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_request_docs_replace_session_docs() {
        let store = Arc::new(InMemorySessionStore::default());
        let llm = Arc::new(ScriptedReasoner::new(vec![
            Ok("one".to_string()),
            Ok("two".to_string()),
        ]));
        let chat = ChatService::new(store.clone(), Arc::new(ReasoningAgent::new(llm)));

        let first = chat.handle(turn("q1", None, Some(docs()))).await.unwrap();
        let replacement = vec![Document::new("New validator queue data.").with_id("eth-2")];
        let second = chat
            .handle(turn("q2", Some(first.session_id.clone()), Some(replacement)))
            .await
            .unwrap();

        assert_eq!(second.sources[0].id, "eth-2");
        let session = store.get(&first.session_id).await.unwrap().unwrap();
        assert_eq!(session.docs[0].id.as_deref(), Some("eth-2"));
    }
}
