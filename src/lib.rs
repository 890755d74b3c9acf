//! Crypto Agent Orchestrator
//!
//! An agent core for crypto market questions that:
//! - Fits retrieved news into a fixed model token budget with numbered citations
//! - Lets an LLM planner chain news, reasoning and behavioral tools under a confidence gate
//! - Streams planning progress as JSON events
//! - Keeps bounded multi-turn chat sessions over a document set
//! - Degrades to snippet answers and hold plans when the model is unreachable
//!
//! PLANNING LOOP:
//! PLAN → GATE → EXECUTE → (PLAN | FINAL)

pub mod agent;
pub mod analysis;
pub mod api;
pub mod budget;
pub mod config;
pub mod conversational;
pub mod error;
pub mod llm;
pub mod memory;
pub mod models;
pub mod planner;
pub mod state;
pub mod tools;
pub mod trade;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{OrchestrationError, Result};

// Re-export common types
pub use models::*;
