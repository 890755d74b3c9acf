//! Main orchestrator - implements the planning loop
//!
//! PLAN → (EXECUTE → PLAN)* → FINAL, bounded by `max_steps`.
//!
//! The planner picks one action per step. Low-confidence picks are turned
//! into a final answer, tool problems become warning steps, and a planner
//! failure ends the loop with an error step. Every run ends with exactly one
//! final payload.

use crate::error::OrchestrationError;
use crate::models::{
    FinalContext, FinalPayload, OrchestrationEvent, OrchestrationResult, OrchestrationState,
    PlanRequest, StepRecord, StepStatus, ToolParams,
};
use crate::planner::{Decision, Planner, PlanningContext, FINAL_ANSWER};
use crate::tools::{CapabilityRegistry, ToolOutcome};
use crate::Result;
use futures::Stream;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, info, warn};

pub const MAX_STEPS_LIMIT: usize = 20;

const STARTED_MESSAGE: &str = "Planner started.";
const LOW_CONFIDENCE_THOUGHT: &str = "Confidence too low to call another tool.";
const COMPLETED_MESSAGE: &str = "Completed.";
const NO_FINAL_ANSWER: &str = "Plan ended without a final answer.";

/// Main orchestrator that coordinates planner and capabilities
pub struct Orchestrator {
    planner: Arc<dyn Planner>,
    registry: Arc<CapabilityRegistry>,
}

impl Orchestrator {
    pub fn new(planner: Arc<dyn Planner>, registry: Arc<CapabilityRegistry>) -> Self {
        Self { planner, registry }
    }

    /// Reject requests the loop cannot run.
    pub fn validate(request: &PlanRequest) -> Result<()> {
        if request.goal.trim().is_empty() {
            return Err(OrchestrationError::ValidationError(
                "goal must not be empty".to_string(),
            ));
        }
        if !(1..=MAX_STEPS_LIMIT).contains(&request.max_steps) {
            return Err(OrchestrationError::ValidationError(format!(
                "max_steps must be between 1 and {}",
                MAX_STEPS_LIMIT
            )));
        }
        if !(0.0..=1.0).contains(&request.stop_score) {
            return Err(OrchestrationError::ValidationError(
                "stop_score must be between 0 and 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Run to completion and return the final payload with the step log.
    pub async fn run(&self, request: PlanRequest) -> Result<OrchestrationResult> {
        Self::validate(&request)?;

        let outcome = self.drive(&request, |_| true).await;
        let payload = final_payload(&request.goal, &outcome.final_answer, &outcome.state);

        Ok(OrchestrationResult {
            payload,
            steps: outcome.state.steps,
        })
    }

    /// Run on a spawned task, yielding `status`, then each step, then `final`.
    ///
    /// Dropping the stream stops the loop before its next step.
    pub fn stream(
        self: &Arc<Self>,
        request: PlanRequest,
    ) -> Result<impl Stream<Item = OrchestrationEvent>> {
        Self::validate(&request)?;

        let (tx, rx) = mpsc::unbounded_channel();
        let orchestrator = Arc::clone(self);

        tokio::spawn(async move {
            if tx
                .send(OrchestrationEvent::Status {
                    message: STARTED_MESSAGE.to_string(),
                })
                .is_err()
            {
                return;
            }

            let outcome = orchestrator
                .drive(&request, |record| {
                    tx.send(OrchestrationEvent::Step {
                        data: record.clone(),
                    })
                    .is_ok()
                })
                .await;

            if !outcome.cancelled {
                let payload = final_payload(&request.goal, &outcome.final_answer, &outcome.state);
                let _ = tx.send(OrchestrationEvent::Final(payload));
            }
        });

        Ok(UnboundedReceiverStream::new(rx))
    }

    /// The loop itself. `on_step` returns false when nobody is listening.
    async fn drive<F>(&self, request: &PlanRequest, mut on_step: F) -> LoopOutcome
    where
        F: FnMut(&StepRecord) -> bool + Send,
    {
        let start_time = Instant::now();
        let mut state = OrchestrationState::new(
            request.token.as_deref().map(|t| t.trim().to_uppercase()),
            request.user_id.clone(),
        );

        info!(
            goal = %request.goal,
            token = ?request.token,
            user_id = ?request.user_id,
            max_steps = request.max_steps,
            "Orchestrator: starting plan"
        );

        for step in 1..=request.max_steps {
            let context = PlanningContext {
                goal: &request.goal,
                token: request.token.as_deref(),
                user_id: request.user_id.as_deref(),
                state_summary: state.summary(),
                catalog: self.registry.describe(),
                actions: self.registry.names(),
            };

            let decision = match self.planner.next_decision(&context).await {
                Ok(decision) => decision,
                Err(err) => {
                    warn!(step, error = %err, "Planner failed, ending plan");
                    let record = error_step(step, &err);
                    state.steps.push(record.clone());
                    let listening = on_step(&record);
                    return LoopOutcome::finish(state, None, !listening);
                }
            };

            let best_score = decision.best_score();
            let finishing = decision.is_final();
            let Decision {
                action,
                params,
                thought,
                candidate_tools,
                message,
            } = decision;

            let (action, thought) = if !finishing && best_score < request.stop_score {
                debug!(step, action = %action, best_score, "Confidence below stop score");
                let thought = if thought.trim().is_empty() {
                    LOW_CONFIDENCE_THOUGHT.to_string()
                } else {
                    thought
                };
                (FINAL_ANSWER.to_string(), thought)
            } else {
                (action, thought)
            };

            if action == FINAL_ANSWER {
                let answer = message
                    .or_else(|| Some(thought).filter(|t| !t.trim().is_empty()))
                    .unwrap_or_else(|| COMPLETED_MESSAGE.to_string());

                info!(
                    step,
                    elapsed_ms = start_time.elapsed().as_millis() as u64,
                    "Plan finished with final answer"
                );
                return LoopOutcome::finish(state, Some(answer), false);
            }

            let outcome = self.dispatch(&action, &params, &mut state).await;
            debug!(step, action = %action, status = ?outcome.status, "Step executed");

            let record = StepRecord {
                step,
                action,
                thought,
                result: outcome.summary,
                candidate_tools,
                score: best_score,
                status: outcome.status,
            };
            state.steps.push(record.clone());

            if !on_step(&record) {
                debug!(step, "Listener gone, stopping plan");
                return LoopOutcome::finish(state, None, true);
            }
        }

        info!(
            steps = state.steps.len(),
            elapsed_ms = start_time.elapsed().as_millis() as u64,
            "Plan exhausted its steps"
        );
        LoopOutcome::finish(state, None, false)
    }

    /// Validate and run one capability. Never fails the loop.
    async fn dispatch(
        &self,
        action: &str,
        params: &ToolParams,
        state: &mut OrchestrationState,
    ) -> ToolOutcome {
        if let Err(err) = self.registry.validate_params(action, params) {
            return match err {
                OrchestrationError::UnknownTool(name) => {
                    warn!(action = %name, "Planner requested an unknown tool");
                    ToolOutcome::warning(format!("Unknown tool '{}'.", name))
                }
                OrchestrationError::ValidationError(reason) => ToolOutcome::warning(reason),
                other => ToolOutcome::warning(other.to_string()),
            };
        }

        let Some(capability) = self.registry.get(action) else {
            return ToolOutcome::warning(format!("Unknown tool '{}'.", action));
        };

        match capability.execute(params, state).await {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(action, error = %err, "Tool failed");
                ToolOutcome::warning(format!("{} failed: {}", action, err))
            }
        }
    }
}

/// Loop result before it is turned into a payload.
struct LoopOutcome {
    state: OrchestrationState,
    final_answer: String,
    cancelled: bool,
}

impl LoopOutcome {
    /// Without an explicit answer, fall back to the cached analysis.
    fn finish(state: OrchestrationState, answer: Option<String>, cancelled: bool) -> Self {
        let final_answer = answer.unwrap_or_else(|| {
            state
                .last_analysis
                .as_ref()
                .map(|a| a.answer.clone())
                .unwrap_or_else(|| NO_FINAL_ANSWER.to_string())
        });
        Self {
            state,
            final_answer,
            cancelled,
        }
    }
}

fn final_payload(goal: &str, final_answer: &str, state: &OrchestrationState) -> FinalPayload {
    FinalPayload {
        goal: goal.to_string(),
        final_answer: final_answer.to_string(),
        context: FinalContext {
            analysis: state.last_analysis.clone(),
            persona: state.last_persona.clone(),
        },
    }
}

fn error_step(step: usize, err: &OrchestrationError) -> StepRecord {
    let (thought, result) = match err {
        OrchestrationError::ParseError(failure) => (failure.to_string(), failure.raw.clone()),
        other => (other.to_string(), String::new()),
    };

    StepRecord {
        step,
        action: "error".to_string(),
        thought,
        result,
        candidate_tools: Vec::new(),
        score: 0.0,
        status: StepStatus::Error,
    }
}
