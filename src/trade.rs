//! Live trade advisor
//!
//! Turns fresh news context for a token into a small, sanitized trade plan.
//! Any failure along the way degrades to a zero-confidence hold.

use crate::analysis::ReasoningAgent;
use crate::error::OrchestrationError;
use crate::llm::ReasoningService;
use crate::models::Answer;
use crate::planner::decision::extract_fenced_json;
use crate::tools::ContextSource;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, warn};

pub const DEFAULT_TRADE_TOP_K: usize = 6;

const TRADE_MAX_TOKENS: u32 = 300;

const TRADE_SYSTEM_PROMPT: &str = "You are a cautious crypto trading assistant. \
Propose a single trade from the analysis and context only. \
Respond with JSON: {\"side\": \"buy|sell|hold\", \"amount\": number, \"confidence\": number between 0 and 1, \"rationale\": \"...\"}.";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TradeSide {
    Buy,
    Sell,
    Hold,
}

impl fmt::Display for TradeSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let side = match self {
            TradeSide::Buy => "buy",
            TradeSide::Sell => "sell",
            TradeSide::Hold => "hold",
        };
        f.write_str(side)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TradePlan {
    pub side: TradeSide,
    pub amount: f64,
    pub asset: String,
    pub confidence: f64,
    #[serde(default)]
    pub rationale: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_note: Option<String>,
}

impl TradePlan {
    /// Zero-confidence hold used whenever no usable plan is available.
    pub fn hold(asset: &str, rationale: impl Into<String>) -> Self {
        Self {
            side: TradeSide::Hold,
            amount: 0.0,
            asset: asset.to_string(),
            confidence: 0.0,
            rationale: rationale.into(),
            policy_note: None,
        }
    }

    /// Clamp confidence to [0, 1] and amount to >= 0; non-finite values become 0.
    fn sanitized(mut self) -> Self {
        self.confidence = if self.confidence.is_finite() {
            self.confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };
        self.amount = if self.amount.is_finite() {
            self.amount.max(0.0)
        } else {
            0.0
        };
        self
    }
}

/// What to do with a model-proposed sell.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SellSignalPolicy {
    /// Rewrite sells to holds and note it on the plan.
    #[default]
    DowngradeToHold,
    PassThrough,
}

impl FromStr for SellSignalPolicy {
    type Err = OrchestrationError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "hold" | "downgrade" | "downgrade_to_hold" => Ok(SellSignalPolicy::DowngradeToHold),
            "allow" | "pass" | "passthrough" | "pass_through" => Ok(SellSignalPolicy::PassThrough),
            other => Err(OrchestrationError::ConfigError(format!(
                "Unsupported SELL_SIGNAL_POLICY '{}'",
                other
            ))),
        }
    }
}

impl SellSignalPolicy {
    pub fn apply(&self, mut plan: TradePlan) -> TradePlan {
        if *self == SellSignalPolicy::DowngradeToHold && plan.side == TradeSide::Sell {
            warn!(asset = %plan.asset, "Sell signal downgraded to hold");
            plan.side = TradeSide::Hold;
            plan.policy_note = Some("Sell signal downgraded to hold by policy.".to_string());
        }
        plan
    }
}

/// Response of a live trade decision
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveTradeDecision {
    pub token: String,
    pub trade_plan: TradePlan,
    pub analysis: Answer,
}

#[derive(Deserialize)]
struct PlanReply {
    side: TradeSide,
    #[serde(default)]
    amount: f64,
    #[serde(default)]
    confidence: f64,
    #[serde(default)]
    rationale: String,
}

pub struct LiveTradeAdvisor {
    news: Arc<dyn ContextSource>,
    reasoner: Arc<ReasoningAgent>,
    llm: Arc<dyn ReasoningService>,
    policy: SellSignalPolicy,
}

impl LiveTradeAdvisor {
    pub fn new(
        news: Arc<dyn ContextSource>,
        reasoner: Arc<ReasoningAgent>,
        llm: Arc<dyn ReasoningService>,
        policy: SellSignalPolicy,
    ) -> Self {
        Self {
            news,
            reasoner,
            llm,
            policy,
        }
    }

    pub async fn decide(
        &self,
        token: &str,
        prompt: Option<&str>,
        top_k: usize,
    ) -> Result<LiveTradeDecision> {
        let token = token.trim().to_uppercase();
        if token.is_empty() {
            return Err(OrchestrationError::ValidationError(
                "token must not be empty".to_string(),
            ));
        }

        let docs = self.news.fetch_context(&token, top_k.max(1)).await?;
        if docs.is_empty() {
            return Err(OrchestrationError::NotFound(
                "No news context available for this token.".to_string(),
            ));
        }

        let question = prompt
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("What is the near-term outlook for {}?", token));
        let analysis = self.reasoner.answer(&question, &docs).await;

        let plan = self.propose(&token, &question, &analysis).await;
        let plan = self.policy.apply(plan.sanitized());

        info!(
            token = %token,
            side = %plan.side,
            confidence = plan.confidence,
            "Live trade plan ready"
        );

        Ok(LiveTradeDecision {
            token,
            trade_plan: plan,
            analysis,
        })
    }

    async fn propose(&self, token: &str, question: &str, analysis: &Answer) -> TradePlan {
        let user_prompt = format!(
            "Asset: {}\nTrader question: {}\n\nAnalysis:\n{}\n\nReturn the trade plan JSON.",
            token, question, analysis.answer
        );

        let raw = match self
            .llm
            .complete(TRADE_SYSTEM_PROMPT, &user_prompt, TRADE_MAX_TOKENS)
            .await
        {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "Trade plan request failed, holding");
                return TradePlan::hold(token, "Reasoning service unavailable.");
            }
        };

        match serde_json::from_str::<PlanReply>(extract_fenced_json(&raw)) {
            Ok(reply) => TradePlan {
                side: reply.side,
                amount: reply.amount,
                asset: token.to_string(),
                confidence: reply.confidence,
                rationale: reply.rationale,
                policy_note: None,
            },
            Err(e) => {
                warn!(error = %e, "Unparsable trade plan, holding");
                TradePlan::hold(token, "Could not read a trade plan from the model.")
            }
        }
    }
}
