//! Behavioral profiling of a user's trading history

use super::{string_param, Capability, ParamKind, ParamSpec, ServiceClient, ToolOutcome};
use crate::error::OrchestrationError;
use crate::models::{Affinity, OrchestrationState, Persona, ToolParams};
use crate::Result;
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Style summary and ranked asset matches for one user.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Profile {
    pub user_id: String,
    #[serde(default, rename = "analysis")]
    pub summary: String,
    #[serde(default, rename = "recommendations")]
    pub affinities: Vec<Affinity>,
}

#[async_trait]
pub trait ProfileSource: Send + Sync {
    /// `Ok(None)` when the user has no transactions.
    async fn profile_user(&self, user_id: &str) -> Result<Option<Profile>>;
}

/// `GET {base}/behavioral/style?user_id=…`
pub struct HttpProfileSource {
    api: ServiceClient,
}

impl HttpProfileSource {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        Self {
            api: ServiceClient::new(base_url, timeout),
        }
    }
}

#[async_trait]
impl ProfileSource for HttpProfileSource {
    async fn profile_user(&self, user_id: &str) -> Result<Option<Profile>> {
        self.api
            .get_json("/behavioral/style", &[("user_id", user_id)])
            .await
    }
}

pub struct NoProfileSource;

#[async_trait]
impl ProfileSource for NoProfileSource {
    async fn profile_user(&self, _user_id: &str) -> Result<Option<Profile>> {
        Err(OrchestrationError::ConfigError(
            "PROFILE_API_BASE_URL (or TOOLS_API_BASE_URL) is not configured".to_string(),
        ))
    }
}

pub struct BehavioralTool {
    source: Arc<dyn ProfileSource>,
}

impl BehavioralTool {
    pub fn new(source: Arc<dyn ProfileSource>) -> Self {
        Self { source }
    }
}

const PARAMS: &[ParamSpec] = &[ParamSpec::optional("user_id", ParamKind::String)];

#[async_trait]
impl Capability for BehavioralTool {
    fn name(&self) -> &'static str {
        "behavioral_agent"
    }

    fn description(&self) -> &'static str {
        "Reads user transaction history, summarizes persona and recommends tokens."
    }

    fn params(&self) -> &'static [ParamSpec] {
        PARAMS
    }

    async fn execute(
        &self,
        params: &ToolParams,
        state: &mut OrchestrationState,
    ) -> Result<ToolOutcome> {
        let Some(user_id) = string_param(params, "user_id")
            .map(str::to_string)
            .or_else(|| state.user_id.clone())
        else {
            return Ok(ToolOutcome::warning("behavioral_agent requires user_id."));
        };

        let Some(profile) = self.source.profile_user(&user_id).await? else {
            return Ok(ToolOutcome::warning(format!(
                "No transactions found for {}.",
                user_id
            )));
        };

        let top = profile.affinities.first().cloned();
        let summary = match &top {
            Some(top) => format!(
                "Persona summary generated. Top match: {} ({}).",
                top.symbol,
                top.trader_type.as_deref().unwrap_or("unknown")
            ),
            None => "Persona summary generated. No matching assets.".to_string(),
        };

        info!(user_id = %profile.user_id, matches = profile.affinities.len(), "Persona identified");

        state.last_persona = Some(Persona {
            user_id: profile.user_id,
            summary: profile.summary,
            top,
            affinities: profile.affinities,
        });

        Ok(ToolOutcome::ok(summary))
    }
}
