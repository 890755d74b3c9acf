//! Question answering over the cached news documents

use super::{string_param, Capability, ParamKind, ParamSpec, ToolOutcome};
use crate::analysis::ReasoningAgent;
use crate::models::{OrchestrationState, ToolParams};
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;

pub struct ReasoningTool {
    agent: Arc<ReasoningAgent>,
}

impl ReasoningTool {
    pub fn new(agent: Arc<ReasoningAgent>) -> Self {
        Self { agent }
    }
}

const PARAMS: &[ParamSpec] = &[ParamSpec::required("question", ParamKind::String)];

#[async_trait]
impl Capability for ReasoningTool {
    fn name(&self) -> &'static str {
        "reasoning_agent"
    }

    fn description(&self) -> &'static str {
        "Answers financial questions from the cached docs with numbered citations."
    }

    fn params(&self) -> &'static [ParamSpec] {
        PARAMS
    }

    async fn execute(
        &self,
        params: &ToolParams,
        state: &mut OrchestrationState,
    ) -> Result<ToolOutcome> {
        let Some(question) = string_param(params, "question") else {
            return Ok(ToolOutcome::warning(
                "reasoning_agent requires a 'question' parameter.",
            ));
        };
        if state.docs.is_empty() {
            return Ok(ToolOutcome::warning(
                "No cached docs to reason over. Run news_agent first.",
            ));
        }

        let answer = self.agent.answer(question, &state.docs).await;
        let summary = format!("Answer: {}", answer.answer);
        state.last_analysis = Some(answer);

        Ok(ToolOutcome::ok(summary))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Document, StepStatus};
    use crate::testing::ScriptedReasoner;
    use serde_json::json;

    fn params(value: serde_json::Value) -> ToolParams {
        value.as_object().cloned().unwrap_or_default()
    }

    #[tokio::test]
    async fn test_requires_cached_docs() {
        let llm = Arc::new(ScriptedReasoner::new(vec![]));
        let tool = ReasoningTool::new(Arc::new(ReasoningAgent::new(llm.clone())));
        let mut state = OrchestrationState::default();

        let outcome = tool
            .execute(&params(json!({"question": "Is BTC bullish?"})), &mut state)
            .await
            .unwrap();

        assert_eq!(outcome.status, StepStatus::Warning);
        assert!(outcome.summary.contains("Run news_agent first"));
        assert!(state.last_analysis.is_none());
        assert_eq!(llm.calls(), 0);
    }

    #[tokio::test]
    async fn test_answer_is_cached() {
        let llm = Arc::new(ScriptedReasoner::new(vec![Ok(
            "Flows are positive [1].".to_string()
        )]));
        let tool = ReasoningTool::new(Arc::new(ReasoningAgent::new(llm)));
        let mut state = OrchestrationState::new(Some("BTC".into()), None);
        state.docs = vec![Document::new("Spot ETF inflows reached 1B this week.")];

        let outcome = tool
            .execute(&params(json!({"question": "Is BTC bullish?"})), &mut state)
            .await
            .unwrap();

        assert_eq!(outcome, ToolOutcome::ok("Answer: Flows are positive [1]."));
        let analysis = state.last_analysis.unwrap();
        assert_eq!(analysis.sources.len(), 1);
    }
}
