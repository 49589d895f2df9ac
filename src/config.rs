//! Configuration loading with env-var overrides.
//!
//! Reads `config/default.toml` relative to the current working directory,
//! then applies `CONCIERGE_DOCUMENTS_DIR` and `CONCIERGE_LOG_LEVEL` env
//! overrides. The LLM API key comes from `LLM_API_KEY` only.

use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::Deserialize;

use crate::error::AppError;

/// Corpus sources (`[corpus]`).
#[derive(Debug, Clone)]
pub struct CorpusConfig {
    /// Directory scanned for `.txt` / `.json` / `.csv` documents.
    pub documents_dir: PathBuf,
    /// Optional JSON feed of pre-shaped records.
    pub feed_file: Option<PathBuf>,
    /// Chars kept either side of a text match.
    pub snippet_radius: usize,
}

/// Retrieval limits (`[retrieval]`).
#[derive(Debug, Clone)]
pub struct RetrievalConfig {
    /// Hits requested from each search per sub-query.
    pub per_query_limit: usize,
    /// Text hits kept after merging.
    pub text_cap: usize,
    /// Structured hits kept after merging.
    pub structured_cap: usize,
    /// Default context block length, in chars.
    pub max_context_length: usize,
}

/// Session memory settings (`[memory]`).
#[derive(Debug, Clone)]
pub struct MemoryConfig {
    /// Turns kept per (session, channel).
    pub history_cap: usize,
    pub idle_timeout: Duration,
    pub sweep_interval: Duration,
    /// Where to restore/save the memory snapshot; `None` disables it.
    pub snapshot_path: Option<PathBuf>,
}

/// Agent settings (`[agents]`).
#[derive(Debug, Clone)]
pub struct AgentsConfig {
    pub prompts_dir: PathBuf,
    /// Most recent history turns sent with a reply request.
    pub history_window: usize,
}

/// Temperature and token budget for one kind of completion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplingConfig {
    pub temperature: f32,
    pub max_tokens: u32,
}

/// OpenAI / OpenAI-compatible provider configuration.
/// Populated from `[llm.openai]` in the TOML.
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    /// Full chat completions endpoint URL.
    pub api_base_url: String,
    /// Model name passed in the request body.
    pub model: String,
    /// Per-request HTTP timeout in seconds.
    pub timeout_seconds: u64,
}

/// LLM configuration.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Which provider is active: `"none"`, `"dummy"` or `"openai"`.
    /// Maps to `default` in `[llm]` TOML.
    pub provider: String,
    pub openai: OpenAiConfig,
    /// Sampling for query rewriting (`[llm.rewrite]`).
    pub rewrite: SamplingConfig,
    /// Sampling for consulting replies (`[llm.reply]`).
    pub reply: SamplingConfig,
}

/// Fully-resolved configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub bot_name: String,
    pub log_level: String,
    /// Append logs here instead of stderr.
    pub log_file: Option<PathBuf>,
    pub corpus: CorpusConfig,
    pub retrieval: RetrievalConfig,
    pub memory: MemoryConfig,
    pub agents: AgentsConfig,
    pub llm: LlmConfig,
    /// API key from `LLM_API_KEY` env var; `None` for keyless local models.
    /// Never sourced from TOML.
    pub llm_api_key: Option<String>,
}

// ── Raw TOML shape ───────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct RawConfig {
    supervisor: RawSupervisor,
    #[serde(default)]
    corpus: RawCorpus,
    #[serde(default)]
    retrieval: RawRetrieval,
    #[serde(default)]
    memory: RawMemory,
    #[serde(default)]
    agents: RawAgents,
    #[serde(default)]
    llm: RawLlm,
}

#[derive(Deserialize)]
struct RawSupervisor {
    bot_name: String,
    log_level: String,
    #[serde(default)]
    log_file: Option<String>,
}

#[derive(Deserialize)]
struct RawCorpus {
    #[serde(default = "default_documents_dir")]
    documents_dir: String,
    #[serde(default)]
    feed_file: Option<String>,
    #[serde(default = "default_snippet_radius")]
    snippet_radius: usize,
}

impl Default for RawCorpus {
    fn default() -> Self {
        Self {
            documents_dir: default_documents_dir(),
            feed_file: None,
            snippet_radius: default_snippet_radius(),
        }
    }
}

#[derive(Deserialize)]
struct RawRetrieval {
    #[serde(default = "default_per_query_limit")]
    per_query_limit: usize,
    #[serde(default = "default_result_cap")]
    text_cap: usize,
    #[serde(default = "default_result_cap")]
    structured_cap: usize,
    #[serde(default = "default_max_context_length")]
    max_context_length: usize,
}

impl Default for RawRetrieval {
    fn default() -> Self {
        Self {
            per_query_limit: default_per_query_limit(),
            text_cap: default_result_cap(),
            structured_cap: default_result_cap(),
            max_context_length: default_max_context_length(),
        }
    }
}

#[derive(Deserialize)]
struct RawMemory {
    #[serde(default = "default_history_cap")]
    history_cap: usize,
    #[serde(default = "default_idle_timeout_hours")]
    idle_timeout_hours: u64,
    #[serde(default = "default_sweep_interval_secs")]
    sweep_interval_secs: u64,
    #[serde(default)]
    snapshot_path: Option<String>,
}

impl Default for RawMemory {
    fn default() -> Self {
        Self {
            history_cap: default_history_cap(),
            idle_timeout_hours: default_idle_timeout_hours(),
            sweep_interval_secs: default_sweep_interval_secs(),
            snapshot_path: None,
        }
    }
}

#[derive(Deserialize)]
struct RawAgents {
    #[serde(default = "default_prompts_dir")]
    prompts_dir: String,
    #[serde(default = "default_history_window")]
    history_window: usize,
}

impl Default for RawAgents {
    fn default() -> Self {
        Self {
            prompts_dir: default_prompts_dir(),
            history_window: default_history_window(),
        }
    }
}

#[derive(Deserialize)]
struct RawLlm {
    /// Maps to `default = "..."` in `[llm]`.
    #[serde(rename = "default", default = "default_llm_provider")]
    provider: String,
    #[serde(default)]
    openai: RawOpenAiConfig,
    #[serde(default = "default_rewrite_sampling")]
    rewrite: RawSampling,
    #[serde(default = "default_reply_sampling")]
    reply: RawSampling,
}

impl Default for RawLlm {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            openai: RawOpenAiConfig::default(),
            rewrite: default_rewrite_sampling(),
            reply: default_reply_sampling(),
        }
    }
}

#[derive(Deserialize)]
struct RawOpenAiConfig {
    #[serde(default = "default_openai_api_base_url")]
    api_base_url: String,
    #[serde(default = "default_openai_model")]
    model: String,
    #[serde(default = "default_openai_timeout_seconds")]
    timeout_seconds: u64,
}

impl Default for RawOpenAiConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_openai_api_base_url(),
            model: default_openai_model(),
            timeout_seconds: default_openai_timeout_seconds(),
        }
    }
}

#[derive(Deserialize, Clone, Copy)]
struct RawSampling {
    temperature: f32,
    max_tokens: u32,
}

fn default_documents_dir() -> String { "documents".to_string() }
fn default_snippet_radius() -> usize { 200 }
fn default_per_query_limit() -> usize { 2 }
fn default_result_cap() -> usize { 3 }
fn default_max_context_length() -> usize { 2000 }
fn default_history_cap() -> usize { 30 }
fn default_idle_timeout_hours() -> u64 { 24 }
fn default_sweep_interval_secs() -> u64 { 600 }
fn default_prompts_dir() -> String { "config/prompts".to_string() }
fn default_history_window() -> usize { 10 }
fn default_llm_provider() -> String { "none".to_string() }
fn default_openai_api_base_url() -> String { "https://api.openai.com/v1/chat/completions".to_string() }
fn default_openai_model() -> String { "gpt-4o-mini".to_string() }
fn default_openai_timeout_seconds() -> u64 { 60 }
fn default_rewrite_sampling() -> RawSampling { RawSampling { temperature: 0.3, max_tokens: 256 } }
fn default_reply_sampling() -> RawSampling { RawSampling { temperature: 0.7, max_tokens: 512 } }

// ── Loading ──────────────────────────────────────────────────────────────────

/// Load config from `config/default.toml`, then apply env-var overrides.
pub fn load() -> Result<Config, AppError> {
    let documents_dir_override = env::var("CONCIERGE_DOCUMENTS_DIR").ok();
    let log_level_override = env::var("CONCIERGE_LOG_LEVEL").ok();
    let mut config = load_from(
        Path::new("config/default.toml"),
        documents_dir_override.as_deref(),
        log_level_override.as_deref(),
    )?;
    config.llm_api_key = env::var("LLM_API_KEY").ok().filter(|k| !k.is_empty());
    Ok(config)
}

/// Internal loader: accepts an explicit path and optional overrides.
/// Tests pass overrides directly instead of mutating env vars.
pub fn load_from(
    path: &Path,
    documents_dir_override: Option<&str>,
    log_level_override: Option<&str>,
) -> Result<Config, AppError> {
    let raw = fs::read_to_string(path)
        .map_err(|e| AppError::Config(format!("cannot read {}: {e}", path.display())))?;

    let parsed: RawConfig = toml::from_str(&raw)
        .map_err(|e| AppError::Config(format!("parse error in {}: {e}", path.display())))?;

    let s = parsed.supervisor;
    let m = parsed.memory;

    if m.sweep_interval_secs == 0 {
        return Err(AppError::Config("memory.sweep_interval_secs must be greater than 0".into()));
    }
    if parsed.retrieval.per_query_limit == 0 {
        return Err(AppError::Config("retrieval.per_query_limit must be greater than 0".into()));
    }

    let documents_dir = documents_dir_override.unwrap_or(&parsed.corpus.documents_dir);

    Ok(Config {
        bot_name: s.bot_name,
        log_level: log_level_override.unwrap_or(&s.log_level).to_string(),
        log_file: s.log_file.as_deref().map(expand_home),
        corpus: CorpusConfig {
            documents_dir: expand_home(documents_dir),
            feed_file: parsed.corpus.feed_file.as_deref().map(expand_home),
            snippet_radius: parsed.corpus.snippet_radius,
        },
        retrieval: RetrievalConfig {
            per_query_limit: parsed.retrieval.per_query_limit,
            text_cap: parsed.retrieval.text_cap,
            structured_cap: parsed.retrieval.structured_cap,
            max_context_length: parsed.retrieval.max_context_length,
        },
        memory: MemoryConfig {
            history_cap: m.history_cap,
            idle_timeout: Duration::from_secs(m.idle_timeout_hours.saturating_mul(3600)),
            sweep_interval: Duration::from_secs(m.sweep_interval_secs),
            snapshot_path: m.snapshot_path.as_deref().map(expand_home),
        },
        agents: AgentsConfig {
            prompts_dir: expand_home(&parsed.agents.prompts_dir),
            history_window: parsed.agents.history_window,
        },
        llm: LlmConfig {
            provider: parsed.llm.provider,
            openai: OpenAiConfig {
                api_base_url: parsed.llm.openai.api_base_url,
                model: parsed.llm.openai.model,
                timeout_seconds: parsed.llm.openai.timeout_seconds,
            },
            rewrite: SamplingConfig {
                temperature: parsed.llm.rewrite.temperature,
                max_tokens: parsed.llm.rewrite.max_tokens,
            },
            reply: SamplingConfig {
                temperature: parsed.llm.reply.temperature,
                max_tokens: parsed.llm.reply.max_tokens,
            },
        },
        llm_api_key: None,
    })
}

/// Expand a leading `~` to the user's home directory.
/// Absolute or relative paths without `~` are returned unchanged.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    PathBuf::from(path)
}

// ── test helpers ──────────────────────────────────────────────────────────────

/// Safe `Config` for unit tests: no provider, no API keys, no external calls.
#[cfg(test)]
impl Config {
    pub fn test_default() -> Self {
        Self {
            bot_name: "test".into(),
            log_level: "info".into(),
            log_file: None,
            corpus: CorpusConfig {
                documents_dir: PathBuf::from("documents"),
                feed_file: None,
                snippet_radius: default_snippet_radius(),
            },
            retrieval: RetrievalConfig {
                per_query_limit: default_per_query_limit(),
                text_cap: default_result_cap(),
                structured_cap: default_result_cap(),
                max_context_length: default_max_context_length(),
            },
            memory: MemoryConfig {
                history_cap: default_history_cap(),
                idle_timeout: Duration::from_secs(24 * 3600),
                sweep_interval: Duration::from_secs(default_sweep_interval_secs()),
                snapshot_path: None,
            },
            agents: AgentsConfig {
                prompts_dir: PathBuf::from("/nonexistent/prompts"),
                history_window: default_history_window(),
            },
            llm: LlmConfig {
                provider: "none".into(),
                openai: OpenAiConfig {
                    api_base_url: "http://localhost:0/v1/chat/completions".into(),
                    model: "test-model".into(),
                    timeout_seconds: 1,
                },
                rewrite: SamplingConfig { temperature: 0.3, max_tokens: 256 },
                reply: SamplingConfig { temperature: 0.7, max_tokens: 512 },
            },
            llm_api_key: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const MINIMAL_TOML: &str = r#"
[supervisor]
bot_name = "test-bot"
log_level = "info"
"#;

    fn write_toml(content: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    #[test]
    fn parse_minimal_config_fills_defaults() {
        let f = write_toml(MINIMAL_TOML);
        let cfg = load_from(f.path(), None, None).unwrap();
        assert_eq!(cfg.bot_name, "test-bot");
        assert_eq!(cfg.log_level, "info");
        assert_eq!(cfg.corpus.documents_dir, PathBuf::from("documents"));
        assert_eq!(cfg.corpus.snippet_radius, 200);
        assert_eq!(cfg.retrieval.per_query_limit, 2);
        assert_eq!(cfg.retrieval.text_cap, 3);
        assert_eq!(cfg.retrieval.structured_cap, 3);
        assert_eq!(cfg.retrieval.max_context_length, 2000);
        assert_eq!(cfg.memory.history_cap, 30);
        assert_eq!(cfg.memory.idle_timeout, Duration::from_secs(24 * 3600));
        assert_eq!(cfg.agents.history_window, 10);
        assert_eq!(cfg.llm.provider, "none");
        assert_eq!(cfg.llm.rewrite, SamplingConfig { temperature: 0.3, max_tokens: 256 });
        assert!(cfg.llm_api_key.is_none());
    }

    #[test]
    fn parse_full_config() {
        let f = write_toml(
            r#"
[supervisor]
bot_name = "son-duc-duong"
log_level = "debug"
log_file = "/tmp/concierge.log"

[corpus]
documents_dir = "/srv/documents"
feed_file = "/srv/feed.json"
snippet_radius = 120

[retrieval]
per_query_limit = 4
max_context_length = 800

[memory]
history_cap = 12
idle_timeout_hours = 2
sweep_interval_secs = 30
snapshot_path = "/tmp/memory.json"

[llm]
default = "openai"

[llm.openai]
model = "qwen2.5"

[llm.reply]
temperature = 0.5
max_tokens = 300
"#,
        );
        let cfg = load_from(f.path(), None, None).unwrap();
        assert_eq!(cfg.log_file, Some(PathBuf::from("/tmp/concierge.log")));
        assert_eq!(cfg.corpus.feed_file, Some(PathBuf::from("/srv/feed.json")));
        assert_eq!(cfg.corpus.snippet_radius, 120);
        assert_eq!(cfg.retrieval.per_query_limit, 4);
        assert_eq!(cfg.retrieval.text_cap, 3);
        assert_eq!(cfg.memory.history_cap, 12);
        assert_eq!(cfg.memory.idle_timeout, Duration::from_secs(7200));
        assert_eq!(cfg.memory.sweep_interval, Duration::from_secs(30));
        assert_eq!(cfg.llm.provider, "openai");
        assert_eq!(cfg.llm.openai.model, "qwen2.5");
        assert_eq!(cfg.llm.openai.timeout_seconds, 60);
        assert_eq!(cfg.llm.reply.max_tokens, 300);
        assert_eq!(cfg.llm.rewrite.max_tokens, 256);
    }

    #[test]
    fn zero_sweep_interval_rejected() {
        let f = write_toml(&format!("{MINIMAL_TOML}\n[memory]\nsweep_interval_secs = 0\n"));
        let err = load_from(f.path(), None, None).unwrap_err();
        assert!(err.to_string().contains("sweep_interval_secs"));
    }

    #[test]
    fn tilde_expands_to_home() {
        let home = dirs::home_dir().expect("home dir must exist in test env");
        let expanded = expand_home("~/.concierge");
        assert!(expanded.starts_with(&home));
        assert!(expanded.ends_with(".concierge"));
    }

    #[test]
    fn absolute_and_relative_paths_unchanged() {
        assert_eq!(expand_home("/absolute/path"), PathBuf::from("/absolute/path"));
        assert_eq!(expand_home("relative/path"), PathBuf::from("relative/path"));
    }

    #[test]
    fn missing_file_errors() {
        let result = load_from(Path::new("/nonexistent/config.toml"), None, None);
        let msg = result.unwrap_err().to_string();
        assert!(msg.contains("config error"));
    }

    #[test]
    fn env_overrides_apply() {
        let f = write_toml(MINIMAL_TOML);
        let cfg = load_from(f.path(), Some("/tmp/docs"), Some("debug")).unwrap();
        assert_eq!(cfg.corpus.documents_dir, PathBuf::from("/tmp/docs"));
        assert_eq!(cfg.log_level, "debug");
    }
}
