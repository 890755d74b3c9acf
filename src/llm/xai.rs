//! xAI (Grok) client over the OpenAI-compatible chat completions API

use super::ReasoningService;
use crate::error::OrchestrationError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{error, info};

pub struct XaiClient {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl XaiClient {
    pub fn new(api_key: String, model: String, base_url: String, timeout: Duration) -> Self {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .timeout(timeout)
            .build()
            .unwrap_or_default();

        Self {
            client,
            api_key,
            model,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl ReasoningService for XaiClient {
    fn name(&self) -> &'static str {
        "xai"
    }

    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        max_output_tokens: u32,
    ) -> crate::Result<String> {
        if self.api_key.is_empty() {
            return Err(OrchestrationError::ConfigError(
                "XAI_API_KEY not configured".to_string(),
            ));
        }

        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: user_prompt,
                },
            ],
            temperature: 0.2,
            max_tokens: max_output_tokens,
        };

        info!(model = %self.model, max_output_tokens, "Calling xAI chat completions");

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                error!("xAI request failed: {}", e);
                OrchestrationError::TransportError(format!("xAI request failed: {}", e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(%status, "xAI error response: {}", body);
            return Err(OrchestrationError::TransportError(format!(
                "xAI status {}: {}",
                status, body
            )));
        }

        let body: ChatResponse = response.json().await.map_err(|e| {
            OrchestrationError::TransportError(format!("xAI parse error: {}", e))
        })?;

        Ok(body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default())
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_shape() {
        let request = ChatRequest {
            model: "grok-3-mini",
            messages: vec![ChatMessage {
                role: "system",
                content: "plan",
            }],
            temperature: 0.2,
            max_tokens: 400,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "grok-3-mini");
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["max_tokens"], 400);
    }

    #[test]
    fn test_response_without_choices_parses() {
        let body: ChatResponse = serde_json::from_str(r#"{"id":"x"}"#).unwrap();
        assert!(body.choices.is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_transport_error() {
        let client = XaiClient::new(
            "key".into(),
            "grok-3-mini".into(),
            "http://127.0.0.1:9".into(),
            Duration::from_millis(500),
        );
        let err = client.complete("sys", "user", 10).await.unwrap_err();
        assert!(err.is_transport());
    }
}
