//! Reasoning service clients
//!
//! Every model call in the crate goes through [`ReasoningService`], so the
//! planner, the analysis agent and the trade advisor can run against xAI,
//! Gemini, or a scripted stand-in in tests.

use crate::config::{LlmProvider, Settings};
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;

pub mod gemini;
pub mod xai;

pub use gemini::GeminiClient;
pub use xai::XaiClient;

/// Blocking-style completion endpoint with a per-call timeout.
#[async_trait]
pub trait ReasoningService: Send + Sync {
    fn name(&self) -> &'static str;

    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        max_output_tokens: u32,
    ) -> Result<String>;
}

/// Build the configured reasoning service.
pub fn build_reasoning_service(settings: &Settings) -> Arc<dyn ReasoningService> {
    match settings.llm_provider {
        LlmProvider::Xai => Arc::new(XaiClient::new(
            settings.xai_api_key.clone(),
            settings.xai_model.clone(),
            settings.xai_base_url.clone(),
            settings.request_timeout,
        )),
        LlmProvider::Gemini => Arc::new(GeminiClient::new(
            settings.gemini_api_key.clone(),
            settings.request_timeout,
        )),
    }
}
