//! News context retrieval

use super::{string_param, Capability, ParamKind, ParamSpec, ServiceClient, ToolOutcome};
use crate::models::{Document, OrchestrationState, ToolParams};
use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub const DEFAULT_TOP_K: usize = 4;

/// Source of recent documents about a token. Ranking is the source's job.
#[async_trait]
pub trait ContextSource: Send + Sync {
    async fn fetch_context(&self, token: &str, top_k: usize) -> Result<Vec<Document>>;
}

/// `POST {base}/news {token, top_k}` → `{count, results}`.
pub struct HttpContextSource {
    api: ServiceClient,
}

impl HttpContextSource {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        Self {
            api: ServiceClient::new(base_url, timeout),
        }
    }
}

#[derive(Serialize)]
struct NewsRequest<'a> {
    token: &'a str,
    top_k: usize,
}

#[derive(Deserialize)]
struct NewsResponse {
    #[serde(default)]
    results: Vec<Document>,
}

#[async_trait]
impl ContextSource for HttpContextSource {
    async fn fetch_context(&self, token: &str, top_k: usize) -> Result<Vec<Document>> {
        let response: Option<NewsResponse> = self
            .api
            .post_json("/news", &NewsRequest { token, top_k })
            .await?;

        Ok(response.map(|r| r.results).unwrap_or_default())
    }
}

/// Used when no news service is configured.
pub struct NoContextSource;

#[async_trait]
impl ContextSource for NoContextSource {
    async fn fetch_context(&self, _token: &str, _top_k: usize) -> Result<Vec<Document>> {
        Err(crate::error::OrchestrationError::ConfigError(
            "NEWS_API_BASE_URL (or TOOLS_API_BASE_URL) is not configured".to_string(),
        ))
    }
}

pub struct NewsTool {
    source: Arc<dyn ContextSource>,
}

impl NewsTool {
    pub fn new(source: Arc<dyn ContextSource>) -> Self {
        Self { source }
    }
}

const PARAMS: &[ParamSpec] = &[
    ParamSpec::optional("token", ParamKind::String),
    ParamSpec::optional("top_k", ParamKind::Integer),
];

#[async_trait]
impl Capability for NewsTool {
    fn name(&self) -> &'static str {
        "news_agent"
    }

    fn description(&self) -> &'static str {
        "Fetches latest social/news posts for the token. Returns docs."
    }

    fn params(&self) -> &'static [ParamSpec] {
        PARAMS
    }

    async fn execute(
        &self,
        params: &ToolParams,
        state: &mut OrchestrationState,
    ) -> Result<ToolOutcome> {
        let Some(token) = string_param(params, "token")
            .map(str::to_string)
            .or_else(|| state.token.clone())
        else {
            return Ok(ToolOutcome::warning("news_agent requires a token parameter."));
        };
        let token = token.to_uppercase();

        let top_k = params
            .get("top_k")
            .and_then(|v| v.as_u64())
            .map(|k| k as usize)
            .filter(|k| *k > 0)
            .unwrap_or(DEFAULT_TOP_K);

        let docs = self.source.fetch_context(&token, top_k).await?;
        info!(token = %token, count = docs.len(), "News context fetched");

        let summary = format!("Fetched {} docs for {}.", docs.len(), token);
        state.token = Some(token);
        state.docs = docs;

        Ok(ToolOutcome::ok(summary))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::StepStatus;
    use crate::testing::StaticContextSource;
    use serde_json::json;

    fn params(value: serde_json::Value) -> ToolParams {
        value.as_object().cloned().unwrap_or_default()
    }

    #[tokio::test]
    async fn test_fetch_uses_preferred_token() {
        let source = StaticContextSource::with_docs(vec![
            Document::new("BTC ETF inflows hit a record"),
            Document::new("Miners keep selling"),
        ]);
        let tool = NewsTool::new(source.clone());
        let mut state = OrchestrationState::new(Some("btc".into()), None);

        let outcome = tool.execute(&params(json!({})), &mut state).await.unwrap();

        assert_eq!(outcome, ToolOutcome::ok("Fetched 2 docs for BTC."));
        assert_eq!(state.token.as_deref(), Some("BTC"));
        assert_eq!(state.docs.len(), 2);
        assert_eq!(source.requests(), vec![("BTC".to_string(), DEFAULT_TOP_K)]);
    }

    #[tokio::test]
    async fn test_param_token_and_top_k() {
        let source = StaticContextSource::with_docs(vec![Document::new("SOL news")]);
        let tool = NewsTool::new(source.clone());
        let mut state = OrchestrationState::new(Some("BTC".into()), None);

        tool.execute(&params(json!({"token": "sol", "top_k": 2})), &mut state)
            .await
            .unwrap();

        assert_eq!(state.token.as_deref(), Some("SOL"));
        assert_eq!(source.requests(), vec![("SOL".to_string(), 2)]);
    }

    #[tokio::test]
    async fn test_missing_token_is_warning() {
        let tool = NewsTool::new(StaticContextSource::empty());
        let mut state = OrchestrationState::default();

        let outcome = tool.execute(&params(json!({})), &mut state).await.unwrap();

        assert_eq!(outcome.status, StepStatus::Warning);
        assert!(state.docs.is_empty());
        assert!(state.token.is_none());
    }

    #[tokio::test]
    async fn test_unconfigured_source_errors() {
        let tool = NewsTool::new(Arc::new(NoContextSource));
        let mut state = OrchestrationState::new(Some("BTC".into()), None);

        assert!(tool.execute(&params(json!({})), &mut state).await.is_err());
    }
}
