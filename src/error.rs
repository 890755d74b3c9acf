//! Error types for the crypto agent orchestrator

use thiserror::Error;

use crate::planner::decision::ParseFailure;

/// Result type alias for orchestrator operations
pub type Result<T> = std::result::Result<T, OrchestrationError>;

#[derive(Error, Debug)]
pub enum OrchestrationError {

    // =============================
    // Core Pipeline Errors
    // =============================

    /// Network, timeout or non-success status from the reasoning service or a data source.
    #[error("Transport error: {0}")]
    TransportError(String),

    /// Reasoning service reply did not match the decision envelope.
    #[error("Parse error: {0}")]
    ParseError(ParseFailure),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl OrchestrationError {
    /// True when the failure comes from talking to a remote service.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            OrchestrationError::TransportError(_) | OrchestrationError::HttpError(_)
        )
    }
}
