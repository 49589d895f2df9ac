//! Retrieval and session-memory core of the concierge bot.
//!
//! The binary wires these together; integration tests use them directly.

pub mod config;
pub mod error;
pub mod llm;
pub mod logger;
pub mod prompt;
pub mod subsystems;
