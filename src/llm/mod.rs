//! Completion provider abstraction.
//!
//! `LlmProvider` is an enum over concrete provider implementations.
//! Add a new variant + module in `providers/` for each additional backend.
//!
//! Provider instances are shared immutable capabilities; clone them freely.
//! `generate` is an `async fn` on the enum so callers need no trait-object
//! machinery.

pub mod providers;

use thiserror::Error;

use crate::subsystems::memory::ConversationTurn;

// ── Error ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("unknown provider: {0}")]
    UnknownProvider(String),
    #[error("provider request failed: {0}")]
    Request(String),
}

// ── Request ───────────────────────────────────────────────────────────────────

/// One completion round-trip: system prompt, prior turns, the new input and
/// sampling parameters.
#[derive(Debug, Clone, Copy)]
pub struct CompletionRequest<'a> {
    pub system_prompt: &'a str,
    pub user_input: &'a str,
    /// Prior turns, oldest first.
    pub history: &'a [ConversationTurn],
    pub temperature: f32,
    pub max_tokens: u32,
}

impl<'a> CompletionRequest<'a> {
    pub fn new(system_prompt: &'a str, user_input: &'a str) -> Self {
        Self {
            system_prompt,
            user_input,
            history: &[],
            temperature: 0.7,
            max_tokens: 1024,
        }
    }

    pub fn with_history(mut self, history: &'a [ConversationTurn]) -> Self {
        self.history = history;
        self
    }

    pub fn with_sampling(mut self, temperature: f32, max_tokens: u32) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }
}

// ── Provider enum ─────────────────────────────────────────────────────────────

/// All available provider backends.
///
/// Enum dispatch avoids `dyn` trait objects and the `async-trait` dependency.
/// Adding a backend = new module + new variant + new `generate` arm.
#[derive(Debug, Clone)]
pub enum LlmProvider {
    Dummy(providers::dummy::DummyProvider),
    #[cfg(feature = "provider-openai")]
    OpenAiCompatible(providers::openai_compatible::OpenAiCompatibleProvider),
    #[cfg(test)]
    Scripted(providers::scripted::ScriptedProvider),
}

impl LlmProvider {
    /// Run one completion and return the reply text.
    pub async fn generate(&self, request: &CompletionRequest<'_>) -> Result<String, ProviderError> {
        match self {
            LlmProvider::Dummy(p) => p.generate(request).await,
            #[cfg(feature = "provider-openai")]
            LlmProvider::OpenAiCompatible(p) => p.generate(request).await,
            #[cfg(test)]
            LlmProvider::Scripted(p) => p.generate(request).await,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            LlmProvider::Dummy(_) => "dummy",
            #[cfg(feature = "provider-openai")]
            LlmProvider::OpenAiCompatible(_) => "openai",
            #[cfg(test)]
            LlmProvider::Scripted(_) => "scripted",
        }
    }
}
