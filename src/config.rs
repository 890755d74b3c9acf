//! Runtime settings read from the environment
//!
//! Binaries call `dotenv::dotenv()` before `Settings::from_env()` so a local
//! `.env` file can provide any of these values.

use crate::agent::MAX_STEPS_LIMIT;
use crate::error::OrchestrationError;
use crate::models::{DEFAULT_MAX_STEPS, DEFAULT_STOP_SCORE};
use crate::trade::SellSignalPolicy;
use crate::Result;
use std::env;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmProvider {
    Xai,
    Gemini,
}

impl FromStr for LlmProvider {
    type Err = OrchestrationError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "xai" | "grok" => Ok(LlmProvider::Xai),
            "gemini" | "google" => Ok(LlmProvider::Gemini),
            other => Err(OrchestrationError::ConfigError(format!(
                "Unsupported LLM_PROVIDER '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub port: u16,
    pub cors_origins: Vec<String>,

    pub llm_provider: LlmProvider,
    pub xai_api_key: String,
    pub xai_model: String,
    pub xai_base_url: String,
    pub gemini_api_key: String,

    pub news_api_base_url: Option<String>,
    pub profile_api_base_url: Option<String>,
    pub request_timeout: Duration,

    pub max_steps: usize,
    pub stop_score: f64,
    pub token_budget_tokens: usize,
    pub model_answer_tokens: usize,

    pub max_history_chars: usize,
    pub session_ttl: Duration,

    pub sell_signal_policy: SellSignalPolicy,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            port: 8000,
            cors_origins: vec!["http://localhost:3000".to_string()],
            llm_provider: LlmProvider::Xai,
            xai_api_key: String::new(),
            xai_model: "grok-3-mini".to_string(),
            xai_base_url: "https://api.x.ai/v1".to_string(),
            gemini_api_key: String::new(),
            news_api_base_url: None,
            profile_api_base_url: None,
            request_timeout: Duration::from_secs(20),
            max_steps: DEFAULT_MAX_STEPS,
            stop_score: DEFAULT_STOP_SCORE,
            token_budget_tokens: crate::budget::DEFAULT_TOKEN_BUDGET,
            model_answer_tokens: crate::budget::DEFAULT_ANSWER_TOKENS,
            max_history_chars: crate::memory::DEFAULT_MAX_HISTORY_CHARS,
            session_ttl: Duration::from_secs(3600),
            sell_signal_policy: SellSignalPolicy::default(),
        }
    }
}

impl Settings {
    /// Load settings from process environment, falling back to defaults.
    pub fn from_env() -> Result<Self> {
        let defaults = Settings::default();
        let tools_base = optional("TOOLS_API_BASE_URL");

        let settings = Self {
            port: match optional("PORT").or_else(|| optional("API_PORT")) {
                Some(port) => parse_value("PORT", &port)?,
                None => defaults.port,
            },
            cors_origins: optional("CORS_ORIGINS")
                .map(|raw| {
                    raw.split(',')
                        .map(|o| o.trim().to_string())
                        .filter(|o| !o.is_empty())
                        .collect()
                })
                .unwrap_or(defaults.cors_origins),
            llm_provider: match optional("LLM_PROVIDER") {
                Some(provider) => provider.parse()?,
                None => defaults.llm_provider,
            },
            xai_api_key: optional("XAI_API_KEY").unwrap_or_default(),
            xai_model: optional("XAI_MODEL").unwrap_or(defaults.xai_model),
            xai_base_url: optional("XAI_BASE_URL").unwrap_or(defaults.xai_base_url),
            gemini_api_key: optional("GEMINI_API_KEY").unwrap_or_default(),
            news_api_base_url: optional("NEWS_API_BASE_URL").or_else(|| tools_base.clone()),
            profile_api_base_url: optional("PROFILE_API_BASE_URL").or(tools_base),
            request_timeout: Duration::from_secs(number(
                "REQUEST_TIMEOUT_SECS",
                defaults.request_timeout.as_secs(),
            )?),
            max_steps: number("PLANNER_MAX_STEPS", defaults.max_steps)?,
            stop_score: number("PLANNER_STOP_SCORE", defaults.stop_score)?,
            token_budget_tokens: number("TOKEN_BUDGET_TOKENS", defaults.token_budget_tokens)?,
            model_answer_tokens: number("MODEL_ANSWER_TOKENS", defaults.model_answer_tokens)?,
            max_history_chars: number("MAX_HISTORY_CHARS", defaults.max_history_chars)?,
            session_ttl: Duration::from_secs(number(
                "SESSION_TTL_SECS",
                defaults.session_ttl.as_secs(),
            )?),
            sell_signal_policy: match optional("SELL_SIGNAL_POLICY") {
                Some(policy) => policy.parse()?,
                None => defaults.sell_signal_policy,
            },
        };

        settings.validate()?;
        Ok(settings)
    }

    /// Reject planner defaults that every request relying on them would fail with.
    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_STEPS_LIMIT).contains(&self.max_steps) {
            return Err(OrchestrationError::ConfigError(format!(
                "PLANNER_MAX_STEPS must be between 1 and {}, got {}",
                MAX_STEPS_LIMIT, self.max_steps
            )));
        }
        if !(0.0..=1.0).contains(&self.stop_score) {
            return Err(OrchestrationError::ConfigError(format!(
                "PLANNER_STOP_SCORE must be within [0, 1], got {}",
                self.stop_score
            )));
        }
        Ok(())
    }
}

fn optional(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_value<T: FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.parse().map_err(|_| {
        OrchestrationError::ConfigError(format!("{} has an invalid value '{}'", key, raw))
    })
}

fn number<T: FromStr>(key: &str, default: T) -> Result<T> {
    match optional(key) {
        Some(raw) => parse_value(key, &raw),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_reference_values() {
        let settings = Settings::default();
        assert_eq!(settings.port, 8000);
        assert_eq!(settings.max_steps, 4);
        assert!((settings.stop_score - 0.55).abs() < f64::EPSILON);
        assert_eq!(settings.token_budget_tokens, 3800);
        assert_eq!(settings.model_answer_tokens, 500);
        assert_eq!(settings.max_history_chars, 6000);
        assert_eq!(settings.request_timeout, Duration::from_secs(20));
        assert_eq!(settings.sell_signal_policy, SellSignalPolicy::DowngradeToHold);
    }

    #[test]
    fn test_provider_parsing() {
        assert_eq!("grok".parse::<LlmProvider>().unwrap(), LlmProvider::Xai);
        assert_eq!(" Gemini ".parse::<LlmProvider>().unwrap(), LlmProvider::Gemini);
        assert!("openai".parse::<LlmProvider>().is_err());
    }

    #[test]
    fn test_planner_defaults_must_be_usable() {
        assert!(Settings::default().validate().is_ok());

        for max_steps in [0, MAX_STEPS_LIMIT + 1, 50] {
            let settings = Settings {
                max_steps,
                ..Settings::default()
            };
            let err = settings.validate().unwrap_err();
            assert!(matches!(err, OrchestrationError::ConfigError(_)));
            assert!(err.to_string().contains("PLANNER_MAX_STEPS"));
        }

        for stop_score in [-0.1, 1.5, f64::NAN] {
            let settings = Settings {
                stop_score,
                ..Settings::default()
            };
            let err = settings.validate().unwrap_err();
            assert!(err.to_string().contains("PLANNER_STOP_SCORE"));
        }

        let edge = Settings {
            max_steps: MAX_STEPS_LIMIT,
            stop_score: 1.0,
            ..Settings::default()
        };
        assert!(edge.validate().is_ok());
    }

    #[test]
    fn test_invalid_number_is_config_error() {
        let err = parse_value::<u16>("PORT", "eighty").unwrap_err();
        assert!(matches!(err, OrchestrationError::ConfigError(_)));
        assert!(err.to_string().contains("PORT"));
    }
}
