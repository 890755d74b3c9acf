//! Planner trait and implementations
//!
//! The planner asks the reasoning service for the next action given the goal
//! and what the loop has gathered so far. It only decides; the orchestrator
//! executes.

use crate::error::OrchestrationError;
use crate::llm::ReasoningService;
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

pub mod decision;
pub use decision::{parse_decision, Decision, ParseFailure, FINAL_ANSWER};

const PLANNER_MAX_TOKENS: u32 = 400;

/// Everything the planner sees on one turn.
#[derive(Debug, Clone)]
pub struct PlanningContext<'a> {
    pub goal: &'a str,
    pub token: Option<&'a str>,
    pub user_id: Option<&'a str>,
    pub state_summary: String,
    /// Rendered capability catalog.
    pub catalog: String,
    pub actions: Vec<&'static str>,
}

/// Trait for next-action selection (LLM controlled)
#[async_trait]
pub trait Planner: Send + Sync {
    /// Fails with `TransportError` when the service is unreachable and
    /// `ParseError` when its reply is not a decision envelope.
    async fn next_decision(&self, context: &PlanningContext<'_>) -> Result<Decision>;
}

/// Planner backed by a [`ReasoningService`].
pub struct LlmPlanner {
    service: Arc<dyn ReasoningService>,
    max_output_tokens: u32,
}

impl LlmPlanner {
    pub fn new(service: Arc<dyn ReasoningService>) -> Self {
        Self {
            service,
            max_output_tokens: PLANNER_MAX_TOKENS,
        }
    }

    fn system_prompt(actions: &[&str]) -> String {
        let mut valid: Vec<&str> = actions.to_vec();
        valid.push(FINAL_ANSWER);

        format!(
            "You are an orchestration planner. Decide which tool to run next. \
             Always respond with JSON: {{\"action\": \"tool_name\", \"params\": {{...}}, \"thought\": \"...\"}}. \
             Valid actions: {}.",
            valid.join(", ")
        )
    }

    fn user_prompt(context: &PlanningContext<'_>) -> String {
        format!(
            r#"User goal: {}
Preferred token (optional): {}
User id (optional): {}
Current context:
{}

{}
When you have sufficient information, respond with action "final_answer".
Return JSON:
{{
  "action": "tool_name or final_answer",
  "params": {{...}},
  "thought": "reasoning",
  "candidate_tools": [
     {{"name":"news_agent","score":0.72,"reason":"..."}},
     {{"name":"reasoning_agent","score":0.55,"reason":"..."}}
  ],
  "message": "optional final answer"
}}
Scores must be between 0 and 1.

Respond with the next action."#,
            context.goal,
            context.token.unwrap_or("unspecified"),
            context.user_id.unwrap_or("unspecified"),
            context.state_summary,
            context.catalog,
        )
    }
}

#[async_trait]
impl Planner for LlmPlanner {
    async fn next_decision(&self, context: &PlanningContext<'_>) -> Result<Decision> {
        let system = Self::system_prompt(&context.actions);
        let user = Self::user_prompt(context);

        let raw = self
            .service
            .complete(&system, &user, self.max_output_tokens)
            .await?;

        debug!(service = self.service.name(), chars = raw.len(), "Planner reply received");

        parse_decision(&raw).map_err(|failure| {
            warn!(reason = %failure.reason, "Planner reply rejected");
            OrchestrationError::ParseError(failure)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedReasoner;

    fn context() -> PlanningContext<'static> {
        PlanningContext {
            goal: "Is BTC momentum weakening?",
            token: Some("BTC"),
            user_id: None,
            state_summary: "No tools have run yet.".to_string(),
            catalog: "Available tools:\n1) news_agent(token) -> docs".to_string(),
            actions: vec!["news_agent", "reasoning_agent"],
        }
    }

    #[test]
    fn test_prompts_carry_goal_and_catalog() {
        let ctx = context();
        let user = LlmPlanner::user_prompt(&ctx);
        assert!(user.contains("User goal: Is BTC momentum weakening?"));
        assert!(user.contains("Preferred token (optional): BTC"));
        assert!(user.contains("User id (optional): unspecified"));
        assert!(user.contains("No tools have run yet."));
        assert!(user.contains("1) news_agent(token)"));

        let system = LlmPlanner::system_prompt(&ctx.actions);
        assert!(system.ends_with("Valid actions: news_agent, reasoning_agent, final_answer."));
    }

    #[tokio::test]
    async fn test_decision_from_service() {
        let service = Arc::new(ScriptedReasoner::new(vec![Ok(
            r#"{"action":"news_agent","params":{"token":"BTC"},"thought":"fetch"}"#.to_string(),
        )]));
        let planner = LlmPlanner::new(service.clone());

        let decision = planner.next_decision(&context()).await.unwrap();
        assert_eq!(decision.action, "news_agent");
        assert_eq!(service.calls(), 1);
        assert_eq!(service.last_max_tokens(), Some(PLANNER_MAX_TOKENS));
    }

    #[tokio::test]
    async fn test_unparsable_reply_is_parse_error() {
        let service = Arc::new(ScriptedReasoner::new(vec![Ok("no idea".to_string())]));
        let planner = LlmPlanner::new(service);

        let err = planner.next_decision(&context()).await.unwrap_err();
        match err {
            OrchestrationError::ParseError(failure) => assert_eq!(failure.raw, "no idea"),
            other => panic!("unexpected error: {other}"),
        }
    }
}
