//! End-to-end retrieval and consulting tests over the shipped config.
//!
//! Uses the dummy provider, whose echoed reply is never valid rewrite JSON,
//! so expansion always takes the keyword path.
//!
//! Run with:
//!   cargo test --test test_retrieval

use std::path::Path;
use std::sync::Arc;

use concierge_bot::config::{self, Config};
use concierge_bot::llm::providers;
use concierge_bot::subsystems::agents::{APOLOGY, ConsultingAgent};
use concierge_bot::subsystems::corpus::{CorpusStore, SourceRecord};
use concierge_bot::subsystems::memory::{Channel, MemoryConfig, Role, SessionMemory};
use concierge_bot::subsystems::retrieval::{
    ExpansionSource, NO_RESULTS, QueryExpander, Retriever, TRUNCATION_MARKER,
};

// ── helpers ──────────────────────────────────────────────────────────────────

fn shipped_config() -> Config {
    config::load_from(Path::new("config/default.toml"), None, None).expect("default.toml loads")
}

fn corpus() -> Arc<CorpusStore> {
    let store = CorpusStore::default();
    let product = serde_json::json!({
        "id": "son-2k-trang",
        "name": "Sơn 2K Trắng",
        "price": 200000,
        "finish": "bóng"
    });
    store.load([
        SourceRecord::text(
            "thong_tin_son_2k",
            "THÔNG TIN SƠN 2K\nĐộ bóng cao 90%, bền màu ngoài trời.\nGiá: 200,000đ/kg.",
        ),
        SourceRecord::text("bao_quan", "Bảo quản nơi khô ráo, tránh ánh nắng."),
        SourceRecord::structured("son-2k-trang", product.as_object().cloned().unwrap_or_default()),
    ]);
    Arc::new(store)
}

fn retriever(config: &Config) -> Retriever {
    let provider = providers::build(&config.llm, None).expect("provider builds");
    let expander = QueryExpander::from_prompts_dir(provider, config.llm.rewrite, &config.agents.prompts_dir);
    Retriever::new(corpus(), expander, &config.retrieval)
}

// ── retrieval ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn shipped_config_uses_dummy_and_falls_back_to_keywords() {
    let config = shipped_config();
    assert_eq!(config.llm.provider, "dummy");

    let r = retriever(&config);
    let set = r.expander().expand("độ bóng sơn trắng", "s1").await;
    assert_eq!(set.source, ExpansionSource::Keyword);
    assert!(!set.sub_queries.is_empty());
    assert!(r.expander().topic("s1").is_none());
}

#[tokio::test]
async fn context_carries_text_and_product_blocks() {
    let config = shipped_config();
    let ctx = retriever(&config).context_for("sơn trắng bóng", "s1").await;
    assert!(ctx.contains("THÔNG TIN TỪ TÀI LIỆU:"));
    assert!(ctx.contains("[thong_tin_son_2k]"));
    assert!(ctx.contains("THÔNG TIN SẢN PHẨM:"));
    assert!(ctx.contains("- Sơn 2K Trắng:"));
    assert!(ctx.contains("price: 200000"));
}

#[tokio::test]
async fn nothing_relevant_yields_sentinel() {
    let config = shipped_config();
    let r = retriever(&config);
    assert_eq!(r.context_for("xi măng", "s1").await, NO_RESULTS);
    assert_eq!(r.context_for("", "s1").await, NO_RESULTS);
}

#[tokio::test]
async fn context_length_is_bounded() {
    let config = shipped_config();
    let ctx = retriever(&config).get_context("sơn trắng bóng", "s1", 40).await;
    let body = ctx.strip_suffix(TRUNCATION_MARKER).expect("truncated");
    assert_eq!(body.chars().count(), 40);
}

// ── consulting ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn consulting_round_trip_records_both_turns() {
    let config = shipped_config();
    let memory = Arc::new(SessionMemory::new(MemoryConfig { history_cap: config.memory.history_cap }));
    let provider = providers::build(&config.llm, None).expect("provider builds");
    let agent = ConsultingAgent::new(Arc::clone(&memory), Arc::new(retriever(&config)), provider, &config);

    let reply = agent.handle("s1", "sơn 2k giá bao nhiêu").await;
    assert_eq!(reply, "[echo] sơn 2k giá bao nhiêu");

    let history = memory.get_history("s1", Channel::Consulting);
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].role, Role::User);
    assert_eq!(history[1].role, Role::Assistant);
    assert!(memory.get_history("s1", Channel::Classify).is_empty());
}

#[tokio::test]
async fn consulting_without_provider_apologises() {
    let mut config = shipped_config();
    config.llm.provider = "none".into();
    let memory = Arc::new(SessionMemory::default());
    let provider = providers::build(&config.llm, None).expect("provider builds");
    assert!(provider.is_none());

    let agent = ConsultingAgent::new(Arc::clone(&memory), Arc::new(retriever(&config)), provider, &config);
    assert_eq!(agent.handle("s1", "sơn 2k").await, APOLOGY);
    assert_eq!(memory.get_history("s1", Channel::Consulting)[1].content, APOLOGY);
}
