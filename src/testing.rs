//! Scripted collaborators for unit tests

use crate::analysis::ReasoningAgent;
use crate::error::OrchestrationError;
use crate::llm::ReasoningService;
use crate::models::{Affinity, Document};
use crate::tools::{create_default_registry, CapabilityRegistry, ContextSource, Profile, ProfileSource};
use crate::Result;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Replays queued replies in order; errors once the queue is drained.
pub(crate) struct ScriptedReasoner {
    replies: Mutex<VecDeque<Result<String>>>,
    calls: Mutex<Vec<(String, u32)>>,
}

impl ScriptedReasoner {
    pub(crate) fn new(replies: Vec<Result<String>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub(crate) fn last_user_prompt(&self) -> Option<String> {
        self.calls.lock().unwrap().last().map(|(p, _)| p.clone())
    }

    pub(crate) fn last_max_tokens(&self) -> Option<u32> {
        self.calls.lock().unwrap().last().map(|(_, t)| *t)
    }
}

#[async_trait]
impl ReasoningService for ScriptedReasoner {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn complete(
        &self,
        _system_prompt: &str,
        user_prompt: &str,
        max_output_tokens: u32,
    ) -> Result<String> {
        self.calls
            .lock()
            .unwrap()
            .push((user_prompt.to_string(), max_output_tokens));

        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| {
                Err(OrchestrationError::TransportError(
                    "no scripted reply left".to_string(),
                ))
            })
    }
}

pub(crate) struct StaticContextSource {
    docs: Vec<Document>,
    requests: Mutex<Vec<(String, usize)>>,
}

impl StaticContextSource {
    pub(crate) fn with_docs(docs: Vec<Document>) -> Arc<Self> {
        Arc::new(Self {
            docs,
            requests: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn empty() -> Arc<Self> {
        Self::with_docs(Vec::new())
    }

    pub(crate) fn requests(&self) -> Vec<(String, usize)> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ContextSource for StaticContextSource {
    async fn fetch_context(&self, token: &str, top_k: usize) -> Result<Vec<Document>> {
        self.requests
            .lock()
            .unwrap()
            .push((token.to_string(), top_k));
        Ok(self.docs.iter().take(top_k).cloned().collect())
    }
}

pub(crate) struct StaticProfileSource {
    profile: Option<Profile>,
}

impl StaticProfileSource {
    pub(crate) fn empty() -> Arc<Self> {
        Arc::new(Self { profile: None })
    }

    pub(crate) fn momentum_trader(user_id: &str) -> Arc<Self> {
        Arc::new(Self {
            profile: Some(Profile {
                user_id: user_id.to_string(),
                summary: "Momentum trader with short holding periods.".to_string(),
                affinities: vec![
                    Affinity {
                        symbol: "SOL".to_string(),
                        summary: Some("High-throughput L1".to_string()),
                        trader_type: Some("momentum".to_string()),
                        similarity: 0.81,
                        relevance: 0.9,
                    },
                    Affinity {
                        symbol: "AVAX".to_string(),
                        summary: None,
                        trader_type: Some("momentum".to_string()),
                        similarity: 0.64,
                        relevance: 0.7,
                    },
                ],
            }),
        })
    }
}

#[async_trait]
impl ProfileSource for StaticProfileSource {
    async fn profile_user(&self, user_id: &str) -> Result<Option<Profile>> {
        Ok(self
            .profile
            .clone()
            .filter(|profile| profile.user_id == user_id))
    }
}

/// Default registry over static sources; `analysis_replies` feed reasoning_agent.
pub(crate) fn test_registry(
    context: Arc<StaticContextSource>,
    profiles: Arc<StaticProfileSource>,
    analysis_replies: Vec<Result<String>>,
) -> CapabilityRegistry {
    let llm = Arc::new(ScriptedReasoner::new(analysis_replies));
    create_default_registry(context, profiles, Arc::new(ReasoningAgent::new(llm)))
}
