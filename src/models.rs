//! Core data models for the crypto agent

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const DEFAULT_MAX_STEPS: usize = 4;
pub const DEFAULT_STOP_SCORE: f64 = 0.55;

//
// ================= Documents =================
//

/// A retrieved context document. Immutable once fetched.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub context: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

impl Document {
    pub fn new(context: impl Into<String>) -> Self {
        Self {
            id: None,
            title: None,
            context: context.into(),
            link: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_link(mut self, link: impl Into<String>) -> Self {
        self.link = Some(link.into());
        self
    }
}

/// A numbered citation included in an assembled context.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Source {
    #[serde(rename = "idx")]
    pub index: usize,
    pub id: String,
    pub title: String,
    pub link: Option<String>,
    pub snippet: String,
}

/// Reasoning output over a set of documents.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Answer {
    pub answer: String,
    pub sources: Vec<Source>,
}

//
// ================= Planning =================
//

/// A planner-proposed next action. Advisory only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CandidateTool {
    #[serde(default)]
    pub name: String,
    pub score: f64,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Ok,
    Warning,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StepRecord {
    pub step: usize,
    pub action: String,
    pub thought: String,
    pub result: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub candidate_tools: Vec<CandidateTool>,
    pub score: f64,
    pub status: StepStatus,
}

/// One ranked asset match for a trading persona.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Affinity {
    pub symbol: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub trader_type: Option<String>,
    #[serde(default)]
    pub similarity: f64,
    #[serde(default)]
    pub relevance: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Persona {
    pub user_id: String,
    pub summary: String,
    pub top: Option<Affinity>,
    pub affinities: Vec<Affinity>,
}

/// Input of one planning loop.
#[derive(Debug, Clone)]
pub struct PlanRequest {
    pub goal: String,
    pub token: Option<String>,
    pub user_id: Option<String>,
    pub max_steps: usize,
    pub stop_score: f64,
}

impl PlanRequest {
    pub fn new(goal: impl Into<String>) -> Self {
        Self {
            goal: goal.into(),
            token: None,
            user_id: None,
            max_steps: DEFAULT_MAX_STEPS,
            stop_score: DEFAULT_STOP_SCORE,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn with_stop_score(mut self, stop_score: f64) -> Self {
        self.stop_score = stop_score;
        self
    }
}

/// Working state of a single planning loop. Never shared across requests.
#[derive(Debug, Clone, Default, Serialize)]
pub struct OrchestrationState {
    pub token: Option<String>,
    pub user_id: Option<String>,
    pub docs: Vec<Document>,
    pub last_analysis: Option<Answer>,
    pub last_persona: Option<Persona>,
    pub steps: Vec<StepRecord>,
}

impl OrchestrationState {
    pub fn new(token: Option<String>, user_id: Option<String>) -> Self {
        Self {
            token,
            user_id,
            ..Default::default()
        }
    }

    /// Short text description of what the tools produced so far.
    pub fn summary(&self) -> String {
        let mut notes = Vec::new();

        if !self.docs.is_empty() {
            notes.push(format!(
                "- Cached {} news documents for {}.",
                self.docs.len(),
                self.token.as_deref().unwrap_or("unknown token")
            ));
        }
        if self.last_analysis.is_some() {
            notes.push("- Latest reasoning answer cached.".to_string());
        }
        if self.last_persona.is_some() {
            notes.push("- Behavioral persona identified.".to_string());
        }

        if notes.is_empty() {
            "No tools have run yet.".to_string()
        } else {
            notes.join("\n")
        }
    }
}

//
// ================= Loop Output =================
//

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FinalContext {
    pub analysis: Option<Answer>,
    pub persona: Option<Persona>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FinalPayload {
    pub goal: String,
    pub final_answer: String,
    pub context: FinalContext,
}

/// Events of the streaming mode, serialized one per line.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OrchestrationEvent {
    Status { message: String },
    Step { data: StepRecord },
    Final(FinalPayload),
}

impl OrchestrationEvent {
    pub fn is_final(&self) -> bool {
        matches!(self, OrchestrationEvent::Final(_))
    }
}

/// Output of the blocking mode: the final payload plus the step log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestrationResult {
    #[serde(flatten)]
    pub payload: FinalPayload,
    pub steps: Vec<StepRecord>,
}

/// Parameters the planner chose for a capability.
pub type ToolParams = serde_json::Map<String, Value>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_summary_empty() {
        let state = OrchestrationState::default();
        assert_eq!(state.summary(), "No tools have run yet.");
    }

    #[test]
    fn test_state_summary_lists_progress() {
        let mut state = OrchestrationState::new(Some("BTC".into()), None);
        state.docs = vec![Document::new("a"), Document::new("b")];
        state.last_analysis = Some(Answer {
            answer: "ok".into(),
            sources: vec![],
        });

        let summary = state.summary();
        assert!(summary.contains("Cached 2 news documents for BTC."));
        assert!(summary.contains("Latest reasoning answer cached."));
        assert!(!summary.contains("persona"));
    }

    #[test]
    fn test_event_serialization_shape() {
        let status = OrchestrationEvent::Status {
            message: "Planner started.".into(),
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["type"], "status");
        assert_eq!(json["message"], "Planner started.");

        let final_event = OrchestrationEvent::Final(FinalPayload {
            goal: "g".into(),
            final_answer: "done".into(),
            context: FinalContext {
                analysis: None,
                persona: None,
            },
        });
        let json = serde_json::to_value(&final_event).unwrap();
        assert_eq!(json["type"], "final");
        assert_eq!(json["final_answer"], "done");
        assert!(json["context"]["analysis"].is_null());
    }

    #[test]
    fn test_source_index_serialized_as_idx() {
        let source = Source {
            index: 1,
            id: "doc1".into(),
            title: "t".into(),
            link: None,
            snippet: "s".into(),
        };
        let json = serde_json::to_value(&source).unwrap();
        assert_eq!(json["idx"], 1);
    }
}
