//! Subsystem modules for the concierge bot.

pub mod agents;
pub mod comms;
pub mod corpus;
pub mod memory;
pub mod retrieval;
