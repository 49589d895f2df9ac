//! Completion provider implementations.
//!
//! `build(config, api_key)` is the factory, called at startup.
//! Adding a new backend = new module + new match arm.

pub mod dummy;
#[cfg(feature = "provider-openai")]
pub mod openai_compatible;
#[cfg(test)]
pub mod scripted;

use crate::config::LlmConfig;
use crate::llm::{LlmProvider, ProviderError};

/// Construct the configured provider, or `None` when the provider is
/// `"none"` and the bot runs without a completion capability.
///
/// `api_key` is sourced from `LLM_API_KEY` env (never TOML) and is `None`
/// for keyless local models.
#[cfg_attr(not(feature = "provider-openai"), allow(unused_variables))]
pub fn build(config: &LlmConfig, api_key: Option<String>) -> Result<Option<LlmProvider>, ProviderError> {
    match config.provider.as_str() {
        "none" | "" => Ok(None),
        "dummy" => Ok(Some(LlmProvider::Dummy(dummy::DummyProvider))),
        #[cfg(feature = "provider-openai")]
        "openai" | "openai-compatible" => {
            let oai = &config.openai;
            let p = openai_compatible::OpenAiCompatibleProvider::new(
                oai.api_base_url.clone(),
                oai.model.clone(),
                oai.timeout_seconds,
                api_key,
            )?;
            Ok(Some(LlmProvider::OpenAiCompatible(p)))
        }
        other => Err(ProviderError::UnknownProvider(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn none_builds_no_provider() {
        let mut cfg = Config::test_default();
        cfg.llm.provider = "none".into();
        assert!(build(&cfg.llm, None).unwrap().is_none());
    }

    #[test]
    fn dummy_builds() {
        let mut cfg = Config::test_default();
        cfg.llm.provider = "dummy".into();
        let p = build(&cfg.llm, None).unwrap().unwrap();
        assert_eq!(p.name(), "dummy");
    }

    #[test]
    fn unknown_provider_errors() {
        let mut cfg = Config::test_default();
        cfg.llm.provider = "gemini".into();
        let err = build(&cfg.llm, None).unwrap_err();
        assert!(matches!(err, ProviderError::UnknownProvider(name) if name == "gemini"));
    }
}
