//! Consulting agent: retrieval-backed product advice on the `consulting`
//! channel.
//!
//! Per utterance:
//!
//! 1. classify the input (social, acknowledgment, short-unclear, normal);
//! 2. read the channel history (copied out, lock released);
//! 3. for normal questions, build a context block via the [`Retriever`];
//! 4. call the completion provider with no lock held;
//! 5. append the user turn and the reply to the channel.
//!
//! A missing provider or a provider error degrades to [`APOLOGY`].

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use super::utterance::{UtteranceKind, classify};
use crate::config::{Config, SamplingConfig};
use crate::llm::{CompletionRequest, LlmProvider};
use crate::prompt::PromptBuilder;
use crate::subsystems::memory::{Channel, ConversationTurn, SessionMemory};
use crate::subsystems::retrieval::Retriever;

/// Reply used whenever a completion cannot be produced.
pub const APOLOGY: &str = "Xin lỗi, tôi gặp lỗi khi tư vấn. Vui lòng hỏi lại.";

const SOCIAL_SAMPLING: SamplingConfig = SamplingConfig { temperature: 0.8, max_tokens: 100 };
const ACK_SAMPLING: SamplingConfig = SamplingConfig { temperature: 0.7, max_tokens: 80 };
const UNCLEAR_SAMPLING: SamplingConfig = SamplingConfig { temperature: 0.7, max_tokens: 60 };

const DEFAULT_CONSULTING_PROMPT: &str = r#"Bạn là chuyên viên tư vấn sản phẩm sơn của {{bot_name}}.

Tư vấn khách hàng về đặc tính sản phẩm, thành phần, cách pha chế và thi công, giá tiền, ứng dụng phù hợp.

NGUYÊN TẮC:
- Ưu tiên thông tin trong phần THÔNG TIN TỪ TÀI LIỆU và THÔNG TIN SẢN PHẨM bên dưới.
- Chỉ dùng kiến thức chung khi tài liệu không có thông tin.
- Nếu không có giá trong tài liệu: "Dạ, để em kiểm tra giá chính xác và báo lại anh/chị ạ".
- Trả lời ngắn gọn 2-4 câu, xưng "em", gọi khách là "anh/chị".
- Kết thúc bằng câu hỏi khách có cần thêm thông tin gì không."#;

const DEFAULT_SOCIAL_PROMPT: &str = r#"Bạn là trợ lý thân thiện của {{bot_name}}.

Khách vừa gửi lời {{kind}}. Hãy trả lời TỰ NHIÊN, NGẮN GỌN (1-2 câu).
- Nếu chào hỏi: chào lại thân thiện, hỏi cần giúp gì.
- Nếu tạm biệt: chúc tốt lành, mời quay lại.
- Nếu cảm ơn: đáp lại lịch sự.

Xưng "em", gọi khách là "anh/chị"."#;

const DEFAULT_ACK_PROMPT: &str = r#"Bạn là trợ lý của {{bot_name}}.

Khách chỉ nói "ok/oke" mà không có ngữ cảnh trước đó.
Hãy hỏi lại xem khách cần giúp gì. Tự nhiên, ngắn gọn 1 câu."#;

const DEFAULT_UNCLEAR_PROMPT: &str = r#"Bạn là trợ lý của {{bot_name}}.

Khách gửi tin nhắn quá ngắn hoặc không rõ ràng.
Hãy lịch sự hỏi lại. Ngắn gọn, tự nhiên."#;

/// System prompts, resolved once at startup.
#[derive(Debug, Clone)]
pub struct ConsultingPrompts {
    pub consulting: String,
    /// Contains a `{{kind}}` placeholder for the social input kind.
    pub social: String,
    pub acknowledgment: String,
    pub unclear: String,
}

impl ConsultingPrompts {
    /// Load `consulting.txt`, `social.txt`, `acknowledgment.txt` and
    /// `unclear.txt` from `config.agents.prompts_dir`, with built-in
    /// fallbacks.
    pub fn load(config: &Config) -> Self {
        let dir = &config.agents.prompts_dir;
        let load = |file: &str, fallback: &str| {
            PromptBuilder::new(dir)
                .layer_or(file, fallback)
                .var("bot_name", config.bot_name.as_str())
                .build()
        };
        Self {
            consulting: load("consulting.txt", DEFAULT_CONSULTING_PROMPT),
            social: load("social.txt", DEFAULT_SOCIAL_PROMPT),
            acknowledgment: load("acknowledgment.txt", DEFAULT_ACK_PROMPT),
            unclear: load("unclear.txt", DEFAULT_UNCLEAR_PROMPT),
        }
    }
}

pub struct ConsultingAgent {
    memory: Arc<SessionMemory>,
    retriever: Arc<Retriever>,
    provider: Option<LlmProvider>,
    prompts: ConsultingPrompts,
    reply_sampling: SamplingConfig,
    history_window: usize,
}

impl ConsultingAgent {
    pub fn new(
        memory: Arc<SessionMemory>,
        retriever: Arc<Retriever>,
        provider: Option<LlmProvider>,
        config: &Config,
    ) -> Self {
        Self {
            memory,
            retriever,
            provider,
            prompts: ConsultingPrompts::load(config),
            reply_sampling: config.llm.reply,
            history_window: config.agents.history_window,
        }
    }

    /// Answer one utterance for `session_id` and record both turns.
    ///
    /// Never fails: provider trouble turns into [`APOLOGY`]. An empty
    /// `session_id` gets an answer but no memory.
    pub async fn handle(&self, session_id: &str, utterance: &str) -> String {
        let kind = classify(utterance);
        let history = self.memory.get_history(session_id, Channel::Consulting);
        debug!(%session_id, %kind, history = history.len(), "consulting request");

        let (system_prompt, sampling, history) = match kind {
            k if k.is_social() => (
                self.prompts.social.replace("{{kind}}", social_label(k)),
                SOCIAL_SAMPLING,
                Vec::new(),
            ),
            UtteranceKind::Acknowledgment if history.is_empty() => {
                (self.prompts.acknowledgment.clone(), ACK_SAMPLING, Vec::new())
            }
            UtteranceKind::ShortUnclear => (self.prompts.unclear.clone(), UNCLEAR_SAMPLING, Vec::new()),
            _ => {
                let context = self.retriever.context_for(utterance, session_id).await;
                let system = format!("{}\n\n{}", self.prompts.consulting, context);
                (system, self.reply_sampling, recent(history, self.history_window))
            }
        };

        let reply = self.complete(session_id, &system_prompt, utterance, &history, sampling).await;

        self.memory.append_exchange(session_id, Channel::Consulting, utterance, &reply);
        info!(%session_id, %kind, reply_len = reply.chars().count(), "consulting reply");
        reply
    }

    /// Clear the session's consulting history and its retrieval topic.
    /// Returns whether anything was stored for it.
    pub fn reset(&self, session_id: &str) -> bool {
        let had_topic = self.retriever.expander().forget(session_id);
        let had_session = self.memory.clear(session_id, Some(Channel::Consulting));
        had_topic || had_session
    }

    async fn complete(
        &self,
        session_id: &str,
        system_prompt: &str,
        utterance: &str,
        history: &[ConversationTurn],
        sampling: SamplingConfig,
    ) -> String {
        let Some(provider) = &self.provider else {
            warn!(%session_id, "no completion provider configured");
            return APOLOGY.to_string();
        };

        let request = CompletionRequest::new(system_prompt, utterance)
            .with_history(history)
            .with_sampling(sampling.temperature, sampling.max_tokens);

        match provider.generate(&request).await {
            Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
            Ok(_) => {
                warn!(%session_id, "provider returned an empty reply");
                APOLOGY.to_string()
            }
            Err(e) => {
                error!(%session_id, "consulting completion failed: {e}");
                APOLOGY.to_string()
            }
        }
    }
}

fn social_label(kind: UtteranceKind) -> &'static str {
    match kind {
        UtteranceKind::Greeting => "chào hỏi",
        UtteranceKind::Farewell => "tạm biệt",
        _ => "cảm ơn",
    }
}

/// The newest `window` turns, oldest first.
fn recent(mut history: Vec<ConversationTurn>, window: usize) -> Vec<ConversationTurn> {
    let skip = history.len().saturating_sub(window);
    history.drain(..skip);
    history
}
