//! Query expansion: one utterance in, up to five search strings out.
//!
//! ```text
//! utterance ──▶ provider? ──yes──▶ rewrite request ──▶ JSON reply ──ok──▶ Rewrite
//!                  │                      │ error           │ malformed
//!                  no                     ▼                 ▼
//!                  └──────────────▶ keyword extraction ─────────────────▶ Keyword
//! ```
//!
//! A successful rewrite overwrites the session's [`TopicContext`]; the
//! keyword path never touches it. The topic lock is released before the
//! provider call and re-taken only to store the result.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::SamplingConfig;
use crate::llm::{CompletionRequest, LlmProvider};
use crate::prompt::PromptBuilder;

/// Most sub-queries an expansion produces.
pub const MAX_SUB_QUERIES: usize = 5;

/// Words dropped by keyword extraction.
const STOP_WORDS: [&str; 10] = ["là", "gì", "như", "thế", "nào", "được", "không", "có", "của", "thì"];

/// Keywords considered individually by keyword extraction.
const MAX_SINGLE_KEYWORDS: usize = 3;

const REWRITE_PROMPT_FILE: &str = "query_rewrite.txt";

const DEFAULT_REWRITE_PROMPT: &str = r#"Bạn là trợ lý phân tích câu hỏi của khách hàng cửa hàng sơn. CHỈ trả về JSON.

Nhiệm vụ:
1. Xác định chủ đề chính (sản phẩm nào? sơn 2K, sơn 1K, sơn dầu...)
2. Xác định thông tin cần tìm (giá? thành phần? ứng dụng? cách dùng?)
3. Tạo 3-5 search queries ngắn gọn để tìm trong tài liệu

Trả về ĐÚNG format JSON:
{
  "main_topic": "sơn 2K",
  "question_type": "ứng dụng",
  "search_queries": ["sơn 2k", "ứng dụng sơn 2k", "sơn ngoài trời"],
  "entities": ["sơn 2K", "ngoài trời"]
}

CHỈ trả về JSON, không giải thích."#;

// ── Types ────────────────────────────────────────────────────────────────────

/// Which path produced an [`ExpandedQuerySet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpansionSource {
    /// Structured rewrite from the completion provider.
    Rewrite,
    /// Rule-based keyword extraction.
    Keyword,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExpandedQuerySet {
    pub main_topic: Option<String>,
    pub question_type: Option<String>,
    /// Ordered, deduplicated, at most [`MAX_SUB_QUERIES`].
    pub sub_queries: Vec<String>,
    pub entities: Vec<String>,
    pub source: ExpansionSource,
}

impl ExpandedQuerySet {
    fn keywords(sub_queries: Vec<String>) -> Self {
        Self {
            main_topic: None,
            question_type: None,
            sub_queries,
            entities: Vec::new(),
            source: ExpansionSource::Keyword,
        }
    }
}

/// What the previous successful rewrite for a session was about.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopicContext {
    pub last_topic: Option<String>,
    pub last_entities: BTreeSet<String>,
}

/// Expected shape of the provider's rewrite reply.
#[derive(Debug, Deserialize)]
struct RewriteReply {
    #[serde(default)]
    main_topic: Option<String>,
    #[serde(default)]
    question_type: Option<String>,
    #[serde(default)]
    search_queries: Vec<String>,
    #[serde(default)]
    entities: Vec<String>,
}

// ── Expander ─────────────────────────────────────────────────────────────────

pub struct QueryExpander {
    provider: Option<LlmProvider>,
    sampling: SamplingConfig,
    system_prompt: String,
    topics: Mutex<HashMap<String, TopicContext>>,
}

impl QueryExpander {
    pub fn new(provider: Option<LlmProvider>, sampling: SamplingConfig, system_prompt: String) -> Self {
        Self {
            provider,
            sampling,
            system_prompt,
            topics: Mutex::new(HashMap::new()),
        }
    }

    /// Use `query_rewrite.txt` from `prompts_dir` as the rewrite prompt,
    /// falling back to the built-in one.
    pub fn from_prompts_dir(
        provider: Option<LlmProvider>,
        sampling: SamplingConfig,
        prompts_dir: &Path,
    ) -> Self {
        let system_prompt = PromptBuilder::new(prompts_dir)
            .layer_or(REWRITE_PROMPT_FILE, DEFAULT_REWRITE_PROMPT)
            .build();
        Self::new(provider, sampling, system_prompt)
    }

    /// Keyword extraction only.
    pub fn keyword_only() -> Self {
        Self::new(
            None,
            SamplingConfig { temperature: 0.3, max_tokens: 256 },
            DEFAULT_REWRITE_PROMPT.to_string(),
        )
    }

    fn lock_topics(&self) -> MutexGuard<'_, HashMap<String, TopicContext>> {
        self.topics.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Expand `utterance` into sub-queries.
    ///
    /// Never fails: a missing provider, provider error or malformed reply
    /// falls back to keyword extraction. Non-blank input always yields at
    /// least one sub-query; blank input yields none.
    pub async fn expand(&self, utterance: &str, session_id: &str) -> ExpandedQuerySet {
        let utterance = utterance.trim();
        if utterance.is_empty() {
            return ExpandedQuerySet::keywords(Vec::new());
        }

        if let Some(provider) = &self.provider {
            match self.rewrite(provider, utterance, session_id).await {
                Some(set) => {
                    info!(
                        %session_id,
                        topic = ?set.main_topic,
                        queries = ?set.sub_queries,
                        "query rewritten"
                    );
                    return set;
                }
                None => debug!(%session_id, "rewrite unavailable, using keyword extraction"),
            }
        }

        let set = ExpandedQuerySet::keywords(extract_keywords(utterance));
        debug!(%session_id, queries = ?set.sub_queries, "keyword expansion");
        set
    }

    async fn rewrite(
        &self,
        provider: &LlmProvider,
        utterance: &str,
        session_id: &str,
    ) -> Option<ExpandedQuerySet> {
        let prior_topic = if session_id.is_empty() {
            None
        } else {
            self.lock_topics()
                .get(session_id)
                .and_then(|t| t.last_topic.clone())
        };

        let mut user_input = format!("Câu hỏi: \"{utterance}\"");
        if let Some(topic) = &prior_topic {
            user_input.push_str(&format!("\nCâu hỏi trước đó về: {topic}"));
        }

        let request = CompletionRequest::new(&self.system_prompt, &user_input)
            .with_sampling(self.sampling.temperature, self.sampling.max_tokens);

        let reply = match provider.generate(&request).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(%session_id, "query rewrite failed: {e}");
                return None;
            }
        };

        let Some(parsed) = parse_rewrite(&reply) else {
            warn!(%session_id, reply_len = reply.len(), "query rewrite reply malformed");
            return None;
        };

        let set = ExpandedQuerySet {
            main_topic: non_blank(parsed.main_topic),
            question_type: non_blank(parsed.question_type),
            sub_queries: parsed.search_queries,
            entities: clean(parsed.entities, usize::MAX),
            source: ExpansionSource::Rewrite,
        };

        if !session_id.is_empty() {
            self.lock_topics().insert(
                session_id.to_string(),
                TopicContext {
                    last_topic: set.main_topic.clone(),
                    last_entities: set.entities.iter().cloned().collect(),
                },
            );
        }

        Some(set)
    }

    /// Topic left by the last successful rewrite for `session_id`.
    pub fn topic(&self, session_id: &str) -> Option<TopicContext> {
        self.lock_topics().get(session_id).cloned()
    }

    /// Drop the session's topic. Returns whether one was stored.
    pub fn forget(&self, session_id: &str) -> bool {
        self.lock_topics().remove(session_id).is_some()
    }
}

impl std::fmt::Debug for QueryExpander {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryExpander")
            .field("provider", &self.provider.as_ref().map(LlmProvider::name))
            .field("sampling", &self.sampling)
            .finish()
    }
}

// ── Parsing ──────────────────────────────────────────────────────────────────

/// Parse the outermost `{...}` span of `reply`. `None` unless at least one
/// usable search query survives cleaning.
fn parse_rewrite(reply: &str) -> Option<RewriteReply> {
    let start = reply.find('{')?;
    let end = reply.rfind('}')?;
    if end < start {
        return None;
    }
    let mut parsed: RewriteReply = serde_json::from_str(&reply[start..=end]).ok()?;
    parsed.search_queries = clean(std::mem::take(&mut parsed.search_queries), MAX_SUB_QUERIES);
    (!parsed.search_queries.is_empty()).then_some(parsed)
}

/// Trim, drop blanks and duplicates (first wins), keep at most `cap`.
fn clean(items: Vec<String>, cap: usize) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for item in items {
        let item = item.trim();
        if !item.is_empty() && !out.iter().any(|seen| seen == item) {
            out.push(item.to_string());
        }
        if out.len() == cap {
            break;
        }
    }
    out
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

// ── Keyword extraction ───────────────────────────────────────────────────────

/// Rule-based expansion.
///
/// Lowercase, split on whitespace, drop stop words and tokens of two chars
/// or fewer. Emits the joined phrase (when at most three keywords remain),
/// the first three keywords, then adjacent bigrams; deduplicated, at most
/// five. Falls back to the trimmed utterance when nothing survives.
pub fn extract_keywords(utterance: &str) -> Vec<String> {
    let lowered = utterance.to_lowercase();
    let keywords: Vec<&str> = lowered
        .split_whitespace()
        .filter(|w| !STOP_WORDS.contains(w) && w.chars().count() > 2)
        .collect();

    let mut candidates = Vec::new();
    if keywords.len() <= MAX_SINGLE_KEYWORDS {
        candidates.push(keywords.join(" "));
    }
    candidates.extend(keywords.iter().take(MAX_SINGLE_KEYWORDS).map(|k| k.to_string()));
    candidates.extend(keywords.windows(2).map(|pair| pair.join(" ")));

    let queries = clean(candidates, MAX_SUB_QUERIES);
    if queries.is_empty() {
        vec![utterance.trim().to_string()]
    } else {
        queries
    }
}
