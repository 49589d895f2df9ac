//! Agents subsystem.
//!
//! Only the consulting agent lives here; order creation and order lookup
//! are served elsewhere and share nothing with it but [`SessionMemory`]
//! channels.
//!
//! [`SessionMemory`]: crate::subsystems::memory::SessionMemory

pub mod consulting;
pub mod utterance;

pub use consulting::{APOLOGY, ConsultingAgent, ConsultingPrompts};
pub use utterance::{UtteranceKind, classify};
