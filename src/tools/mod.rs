//! Capability trait and registry
//!
//! Capabilities are the tools the planner may call. Each declares its
//! parameters so the registry can reject malformed calls before dispatch
//! and render the catalog the planner reads.

use crate::error::OrchestrationError;
use crate::models::{OrchestrationState, StepStatus, ToolParams};
use crate::Result;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub mod behavioral;
pub mod news;
pub mod reasoning;

pub use behavioral::{BehavioralTool, HttpProfileSource, NoProfileSource, Profile, ProfileSource};
pub use news::{ContextSource, HttpContextSource, NewsTool, NoContextSource};
pub use reasoning::ReasoningTool;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    String,
    Integer,
}

impl ParamKind {
    fn accepts(&self, value: &Value) -> bool {
        match self {
            ParamKind::String => value.is_string(),
            ParamKind::Integer => value.is_i64() || value.is_u64(),
        }
    }

    fn label(&self) -> &'static str {
        match self {
            ParamKind::String => "string",
            ParamKind::Integer => "integer",
        }
    }
}

/// Declared parameter of a capability.
#[derive(Debug, Clone, Copy)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: ParamKind,
    pub required: bool,
}

impl ParamSpec {
    pub const fn required(name: &'static str, kind: ParamKind) -> Self {
        Self {
            name,
            kind,
            required: true,
        }
    }

    pub const fn optional(name: &'static str, kind: ParamKind) -> Self {
        Self {
            name,
            kind,
            required: false,
        }
    }
}

/// What a capability reports back to the loop.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutcome {
    pub summary: String,
    pub status: StepStatus,
}

impl ToolOutcome {
    pub fn ok(summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            status: StepStatus::Ok,
        }
    }

    /// Non-fatal problem; the loop records it and continues.
    pub fn warning(summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            status: StepStatus::Warning,
        }
    }
}

/// Trait for a single planner-callable capability
#[async_trait::async_trait]
pub trait Capability: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    fn params(&self) -> &'static [ParamSpec];

    /// Run with already validated params. Mutates `state` only on success.
    async fn execute(&self, params: &ToolParams, state: &mut OrchestrationState)
        -> Result<ToolOutcome>;
}

/// Registry for looking up and dispatching capabilities
pub struct CapabilityRegistry {
    capabilities: HashMap<String, Arc<dyn Capability>>,
    order: Vec<&'static str>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self {
            capabilities: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Registering a name twice replaces the earlier capability.
    pub fn register(&mut self, capability: Arc<dyn Capability>) {
        let name = capability.name();
        if self
            .capabilities
            .insert(name.to_string(), capability)
            .is_none()
        {
            self.order.push(name);
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Capability>> {
        self.capabilities.get(name).cloned()
    }

    /// Names in registration order.
    pub fn names(&self) -> Vec<&'static str> {
        self.order.clone()
    }

    /// Catalog text shown to the planner.
    pub fn describe(&self) -> String {
        let mut out = String::from("Available tools:\n");
        for (i, name) in self.order.iter().enumerate() {
            let Some(capability) = self.capabilities.get(*name) else {
                continue;
            };
            let params = capability
                .params()
                .iter()
                .map(|p| {
                    if p.required {
                        p.name.to_string()
                    } else {
                        format!("{}?", p.name)
                    }
                })
                .collect::<Vec<_>>()
                .join(", ");
            out.push_str(&format!(
                "{}) {}({}) -> {}\n",
                i + 1,
                name,
                params,
                capability.description()
            ));
        }
        out
    }

    /// Check `params` against the declared schema of `name`.
    pub fn validate_params(&self, name: &str, params: &ToolParams) -> Result<()> {
        let capability = self
            .get(name)
            .ok_or_else(|| OrchestrationError::UnknownTool(name.to_string()))?;

        for spec in capability.params() {
            match params.get(spec.name) {
                None | Some(Value::Null) if spec.required => {
                    return Err(OrchestrationError::ValidationError(format!(
                        "{} requires a '{}' parameter.",
                        name, spec.name
                    )));
                }
                None | Some(Value::Null) => {}
                Some(value) if !spec.kind.accepts(value) => {
                    return Err(OrchestrationError::ValidationError(format!(
                        "{} expects '{}' to be {}.",
                        name,
                        spec.name,
                        spec.kind.label()
                    )));
                }
                Some(_) => {}
            }
        }

        Ok(())
    }
}

impl Default for CapabilityRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Read an optional string param, treating blank as absent.
pub(crate) fn string_param<'a>(params: &'a ToolParams, key: &str) -> Option<&'a str> {
    params
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// JSON client for the data services behind the tools.
#[derive(Clone)]
pub(crate) struct ServiceClient {
    client: Client,
    base_url: String,
}

impl ServiceClient {
    pub(crate) fn new(base_url: &str, timeout: Duration) -> Self {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(60))
            .pool_max_idle_per_host(8)
            .timeout(timeout)
            .build()
            .unwrap_or_default();

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// POST a JSON body. A 404 is `Ok(None)`.
    pub(crate) async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<Option<T>>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        debug!(%url, "POST data service");

        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                OrchestrationError::TransportError(format!("Request failed for {}: {}", path, e))
            })?;

        Self::read(path, response).await
    }

    /// GET with query params. A 404 is `Ok(None)`.
    pub(crate) async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<Option<T>> {
        let url = format!("{}{}", self.base_url, path);
        debug!(%url, "GET data service");

        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| {
                OrchestrationError::TransportError(format!("Request failed for {}: {}", path, e))
            })?;

        Self::read(path, response).await
    }

    async fn read<T: DeserializeOwned>(path: &str, response: reqwest::Response) -> Result<Option<T>> {
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OrchestrationError::TransportError(format!(
                "Data service returned {} for {}: {}",
                status, path, body
            )));
        }

        Ok(Some(response.json::<T>().await?))
    }
}

/// Registry with the three standard capabilities.
pub fn create_default_registry(
    context: Arc<dyn ContextSource>,
    profiles: Arc<dyn ProfileSource>,
    reasoner: Arc<crate::analysis::ReasoningAgent>,
) -> CapabilityRegistry {
    let mut registry = CapabilityRegistry::new();
    registry.register(Arc::new(NewsTool::new(context)));
    registry.register(Arc::new(ReasoningTool::new(reasoner)));
    registry.register(Arc::new(BehavioralTool::new(profiles)));
    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{test_registry, StaticContextSource, StaticProfileSource};
    use serde_json::json;
    use tokio_test::{assert_err, assert_ok};

    fn params(value: Value) -> ToolParams {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_registry_order_and_catalog() {
        let registry = test_registry(
            StaticContextSource::empty(),
            StaticProfileSource::empty(),
            vec![],
        );

        assert_eq!(
            registry.names(),
            vec!["news_agent", "reasoning_agent", "behavioral_agent"]
        );

        let catalog = registry.describe();
        assert!(catalog.starts_with("Available tools:\n1) news_agent(token?, top_k?) -> "));
        assert!(catalog.contains("2) reasoning_agent(question) -> "));
        assert!(catalog.contains("3) behavioral_agent(user_id?) -> "));
    }

    #[test]
    fn test_validate_params() {
        let registry = test_registry(
            StaticContextSource::empty(),
            StaticProfileSource::empty(),
            vec![],
        );

        assert_ok!(registry.validate_params("news_agent", &params(json!({"token": "BTC", "top_k": 3}))));
        assert_ok!(registry.validate_params("news_agent", &params(json!({"token": null}))));

        let err = assert_err!(registry.validate_params("news_agent", &params(json!({"top_k": "three"}))));
        assert!(err.to_string().contains("expects 'top_k' to be integer"));

        let err = assert_err!(registry.validate_params("reasoning_agent", &params(json!({}))));
        assert!(err.to_string().contains("reasoning_agent requires a 'question' parameter."));

        let err = assert_err!(registry.validate_params("delete_everything", &params(json!({}))));
        assert!(matches!(err, OrchestrationError::UnknownTool(_)));
    }

    #[tokio::test]
    async fn test_service_client_unreachable_is_transport() {
        let client = ServiceClient::new("http://127.0.0.1:9/", Duration::from_millis(500));
        let err = client
            .get_json::<Value>("/behavioral/style", &[("user_id", "u1")])
            .await
            .unwrap_err();
        assert!(err.is_transport());
    }

    #[tokio::test]
    async fn test_service_client_malformed_body_is_http_error() {
        let app = axum::Router::new().route("/news", axum::routing::post(|| async { "not json" }));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let client = ServiceClient::new(&format!("http://{}", addr), Duration::from_secs(2));
        let err = client
            .post_json::<_, Value>("/news", &json!({"token": "BTC", "top_k": 4}))
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestrationError::HttpError(_)));
        assert!(err.is_transport());
    }
}
