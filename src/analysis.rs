//! Grounded question answering
//!
//! Answers are produced only from a budgeted, numbered context and cite it
//! with `[n]` markers. A failing reasoning service never fails the call; the
//! caller gets a snippet-based answer instead.

use crate::budget::{self, build_context, smart_trim, strip_noise, ContextBudgetResult};
use crate::error::OrchestrationError;
use crate::llm::ReasoningService;
use crate::memory::{ChatMessage, ChatRole};
use crate::models::{Answer, Document};
use std::sync::Arc;
use tracing::{debug, warn};

pub const NO_CONTEXT_ANSWER: &str = "I couldn't find relevant context.";

const FALLBACK_SNIPPET_CHARS: usize = 220;

const SYSTEM_PROMPT: &str = "You are a financial information assistant. \
Answer ONLY using the provided context. Do not add numbers you can't justify from context. \
Be concise, risk-aware, and cite with bracket indices like [1], [2].";

const INSTRUCTIONS: &str = "Instructions:\n\
1) Use the context only; no external facts.\n\
2) Add inline citations like [1], [3] where appropriate.\n\
3) If context is insufficient, say what's missing concisely.\n";

/// Token budgets for one answer.
///
/// `answer_tokens` only caps the model output; the context always reserves
/// [`budget::DEFAULT_ANSWER_TOKENS`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnswerBudget {
    pub total_tokens: usize,
    pub answer_tokens: usize,
}

impl Default for AnswerBudget {
    fn default() -> Self {
        Self {
            total_tokens: budget::DEFAULT_TOKEN_BUDGET,
            answer_tokens: budget::DEFAULT_ANSWER_TOKENS,
        }
    }
}

pub struct ReasoningAgent {
    llm: Arc<dyn ReasoningService>,
    budget: AnswerBudget,
}

impl ReasoningAgent {
    pub fn new(llm: Arc<dyn ReasoningService>) -> Self {
        Self {
            llm,
            budget: AnswerBudget::default(),
        }
    }

    pub fn with_budget(mut self, budget: AnswerBudget) -> Self {
        self.budget = budget;
        self
    }

    pub fn default_budget(&self) -> AnswerBudget {
        self.budget
    }

    /// Answer `question` from `docs` with the configured budget.
    pub async fn answer(&self, question: &str, docs: &[Document]) -> Answer {
        self.answer_within(question, docs, self.budget).await
    }

    pub async fn answer_within(
        &self,
        question: &str,
        docs: &[Document],
        budget: AnswerBudget,
    ) -> Answer {
        let context = build_context(docs, budget.total_tokens, budget::DEFAULT_ANSWER_TOKENS);
        if context.is_empty() {
            return no_context();
        }

        let user_prompt = format!(
            "Question:\n{}\n\nContext (numbered sources):\n{}\n\n{}",
            question, context.context, INSTRUCTIONS
        );

        self.complete(user_prompt, context, budget).await
    }

    /// Answer the last user turn of `history` from `docs`.
    pub async fn chat(
        &self,
        docs: &[Document],
        history: &[ChatMessage],
        budget: AnswerBudget,
    ) -> Answer {
        let context = build_context(docs, budget.total_tokens, budget::DEFAULT_ANSWER_TOKENS);
        if context.is_empty() {
            return no_context();
        }

        let question = history
            .iter()
            .rev()
            .find(|m| m.role == ChatRole::User)
            .map(|m| m.content.as_str())
            .unwrap_or_default();

        let transcript = history
            .iter()
            .map(|m| format!("{}: {}", m.role.label(), m.content))
            .collect::<Vec<_>>()
            .join("\n");

        let user_prompt = format!(
            "Conversation so far:\n{}\n\nLatest question:\n{}\n\nContext (numbered sources):\n{}\n\n{}",
            transcript, question, context.context, INSTRUCTIONS
        );

        self.complete(user_prompt, context, budget).await
    }

    async fn complete(
        &self,
        user_prompt: String,
        context: ContextBudgetResult,
        budget: AnswerBudget,
    ) -> Answer {
        debug!(
            sources = context.sources.len(),
            used_tokens = context.used_tokens,
            per_doc_chars = context.per_doc_chars,
            "Context assembled"
        );

        match self
            .llm
            .complete(SYSTEM_PROMPT, &user_prompt, budget.answer_tokens as u32)
            .await
        {
            Ok(reply) => Answer {
                answer: strip_noise(&reply),
                sources: context.sources,
            },
            Err(err) => {
                warn!(service = self.llm.name(), error = %err, "Reasoning service failed, using snippet answer");
                fallback_answer(&err, context)
            }
        }
    }
}

fn no_context() -> Answer {
    Answer {
        answer: NO_CONTEXT_ANSWER.to_string(),
        sources: Vec::new(),
    }
}

fn fallback_answer(err: &OrchestrationError, context: ContextBudgetResult) -> Answer {
    let Some(first) = context.sources.first() else {
        return no_context();
    };

    let snippet = smart_trim(&first.snippet, FALLBACK_SNIPPET_CHARS);
    let second = context
        .sources
        .get(1)
        .map(|s| format!(" [{}]", s.index))
        .unwrap_or_default();

    let answer = match err {
        OrchestrationError::ConfigError(_) => format!(
            "Model offline. From the snippets: {} [{}]{}",
            snippet, first.index, second
        ),
        other => format!(
            "Couldn't reach the reasoning service ({}). Summary: {} [{}]{}",
            other, snippet, first.index, second
        ),
    };

    Answer {
        answer,
        sources: context.sources,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedReasoner;

    fn docs() -> Vec<Document> {
        vec![
            Document::new("Spot ETF inflows reached $1B this week as BTC reclaimed 70k.")
                .with_title("ETF flows")
                .with_link("https://x.com/i/web/status/111"),
            Document::new("Miners moved 5k BTC to exchanges.").with_id("m-1"),
        ]
    }

    #[tokio::test]
    async fn test_no_docs_means_no_context() {
        let llm = Arc::new(ScriptedReasoner::new(vec![]));
        let agent = ReasoningAgent::new(llm.clone());

        let answer = agent.answer("Is BTC bullish?", &[]).await;
        assert_eq!(answer.answer, "I couldn't find relevant context.");
        assert!(answer.sources.is_empty());
        assert_eq!(llm.calls(), 0);
    }

    #[tokio::test]
    async fn test_reply_is_cleaned_and_cited() {
        let llm = Arc::new(ScriptedReasoner::new(vec![Ok(
            "  Inflows   are strong [1]\n\n".to_string()
        )]));
        let agent = ReasoningAgent::new(llm.clone());

        let answer = agent.answer("Is BTC bullish?", &docs()).await;
        assert_eq!(answer.answer, "Inflows are strong [1]");
        assert_eq!(answer.sources.len(), 2);
        assert_eq!(answer.sources[0].id, "111");
        assert_eq!(answer.sources[1].id, "m-1");

        let prompt = llm.last_user_prompt().unwrap();
        assert!(prompt.starts_with("Question:\nIs BTC bullish?"));
        assert!(prompt.contains("[1] ETF flows"));
        assert_eq!(llm.last_max_tokens(), Some(500));
    }

    #[tokio::test]
    async fn test_unreachable_service_falls_back_to_snippet() {
        let llm = Arc::new(ScriptedReasoner::new(vec![Err(
            OrchestrationError::TransportError("connection refused".into()),
        )]));
        let agent = ReasoningAgent::new(llm);
        let single = vec![Document::new("Funding rates flipped negative on major venues.")];

        let answer = agent.answer("What changed?", &single).await;
        assert!(answer.answer.starts_with("Couldn't reach the reasoning service"));
        assert!(answer.answer.contains("Funding rates flipped negative"));
        assert!(answer.answer.ends_with("[1]"));
        assert_eq!(answer.sources.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_key_reads_model_offline() {
        let llm = Arc::new(ScriptedReasoner::new(vec![Err(
            OrchestrationError::ConfigError("XAI_API_KEY not configured".into()),
        )]));
        let agent = ReasoningAgent::new(llm);

        let answer = agent.answer("What changed?", &docs()).await;
        assert!(answer.answer.starts_with("Model offline. From the snippets: "));
        assert!(answer.answer.ends_with("[1] [2]"));
    }

    #[tokio::test]
    async fn test_longer_answers_keep_context_size() {
        let long: Vec<Document> = (0..12)
            .map(|i| Document::new("liquidity ".repeat(100)).with_id(format!("d{}", i)))
            .collect();
        let llm = Arc::new(ScriptedReasoner::new(vec![
            Ok("ok [1]".to_string()),
            Ok("ok [1]".to_string()),
        ]));
        let agent = ReasoningAgent::new(llm.clone());

        let short = agent.answer("Liquidity?", &long).await;
        let verbose = agent
            .answer_within(
                "Liquidity?",
                &long,
                AnswerBudget {
                    total_tokens: 3800,
                    answer_tokens: 2000,
                },
            )
            .await;

        assert_eq!(short.sources.len(), 12);
        assert_eq!(verbose.sources.len(), 12);
        let short_len = short.sources[0].snippet.chars().count();
        assert_eq!(short_len, verbose.sources[0].snippet.chars().count());
        assert!(short_len > 600);
        assert_eq!(llm.last_max_tokens(), Some(2000));
    }

    #[tokio::test]
    async fn test_chat_prompt_carries_transcript() {
        let llm = Arc::new(ScriptedReasoner::new(vec![Ok("Yes [2].".to_string())]));
        let agent = ReasoningAgent::new(llm.clone());
        let history = vec![
            ChatMessage::user("What are ETFs doing?"),
            ChatMessage::assistant("Buying [1]."),
            ChatMessage::user("And miners?"),
        ];

        let answer = agent.chat(&docs(), &history, AnswerBudget::default()).await;
        assert_eq!(answer.answer, "Yes [2].");

        let prompt = llm.last_user_prompt().unwrap();
        assert!(prompt.contains("User: What are ETFs doing?\nAssistant: Buying [1]."));
        assert!(prompt.contains("Latest question:\nAnd miners?"));
    }
}
