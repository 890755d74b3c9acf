//! Decision envelope parsing
//!
//! The reasoning service answers every planning turn with
//! `{action, params, thought, candidate_tools?, message?}`, possibly wrapped
//! in a fenced code block. Parsing is strict: anything that does not match
//! the envelope is a [`ParseFailure`].

use crate::models::{CandidateTool, ToolParams};
use serde::Deserialize;
use serde_json::Value;
use std::fmt;

pub const FINAL_ANSWER: &str = "final_answer";

const FENCE: &str = "```";

/// A validated planner decision.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub action: String,
    pub params: ToolParams,
    pub thought: String,
    pub candidate_tools: Vec<CandidateTool>,
    pub message: Option<String>,
}

impl Decision {
    /// Highest candidate score, 0 when the planner proposed none.
    pub fn best_score(&self) -> f64 {
        self.candidate_tools
            .iter()
            .map(|c| c.score)
            .fold(0.0, f64::max)
    }

    pub fn is_final(&self) -> bool {
        self.action == FINAL_ANSWER
    }
}

/// Why a reply could not be read as a decision, with the raw reply kept for the step log.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseFailure {
    pub reason: String,
    pub raw: String,
}

impl fmt::Display for ParseFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Unable to parse planner response: {}", self.reason)
    }
}

impl std::error::Error for ParseFailure {}

#[derive(Deserialize)]
struct Envelope {
    action: String,
    #[serde(default)]
    params: Option<ToolParams>,
    #[serde(default)]
    thought: Option<String>,
    #[serde(default)]
    candidate_tools: Option<Vec<CandidateTool>>,
    #[serde(default)]
    message: Option<String>,
}

/// Return the interior of the outermost fenced block, minus an optional language tag.
///
/// Text without a complete fence pair is returned trimmed and unchanged.
pub fn extract_fenced_json(raw: &str) -> &str {
    let text = raw.trim();
    let (Some(start), Some(end)) = (text.find(FENCE), text.rfind(FENCE)) else {
        return text;
    };
    if end <= start {
        return text;
    }

    let inner = &text[start + FENCE.len()..end];
    match inner.split_once('\n') {
        Some((tag, rest)) if is_language_tag(tag) => rest.trim(),
        _ => inner.trim(),
    }
}

fn is_language_tag(line: &str) -> bool {
    let tag = line.trim();
    !tag.is_empty()
        && tag
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '+'))
}

/// Parse a planner reply into a [`Decision`].
pub fn parse_decision(raw: &str) -> Result<Decision, ParseFailure> {
    let failure = |reason: String| ParseFailure {
        reason,
        raw: raw.to_string(),
    };

    let body = extract_fenced_json(raw);
    let value: Value =
        serde_json::from_str(body).map_err(|e| failure(format!("invalid JSON ({})", e)))?;

    if !value.is_object() {
        return Err(failure("reply is not a JSON object".to_string()));
    }

    let envelope: Envelope = serde_json::from_value(value)
        .map_err(|e| failure(format!("envelope mismatch ({})", e)))?;

    let action = envelope.action.trim().to_lowercase();
    if action.is_empty() {
        return Err(failure("action is empty".to_string()));
    }

    let candidate_tools = envelope.candidate_tools.unwrap_or_default();
    if let Some(bad) = candidate_tools
        .iter()
        .find(|c| !(0.0..=1.0).contains(&c.score))
    {
        return Err(failure(format!(
            "candidate '{}' has score {} outside [0, 1]",
            bad.name, bad.score
        )));
    }

    Ok(Decision {
        action,
        params: envelope.params.unwrap_or_default(),
        thought: envelope.thought.unwrap_or_default(),
        candidate_tools,
        message: envelope.message.filter(|m| !m.trim().is_empty()),
    })
}
