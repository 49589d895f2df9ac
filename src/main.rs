//! Concierge bot: console entry point.
//!
//! Startup sequence:
//!   1. Load .env (if present)
//!   2. Load config, init logger at configured level
//!   3. Load the document corpus
//!   4. Build the completion provider and retriever
//!   5. Restore session memory from the snapshot (if configured), build the
//!      consulting agent
//!   6. Spawn the idle-session sweeper
//!   7. Run the console until Ctrl-C, `/quit` or EOF
//!   8. Save the memory snapshot

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use concierge_bot::config::{self, Config};
use concierge_bot::error::AppError;
use concierge_bot::llm::providers;
use concierge_bot::logger;
use concierge_bot::subsystems::agents::ConsultingAgent;
use concierge_bot::subsystems::comms::{PtyChannel, run_pty};
use concierge_bot::subsystems::corpus::{CorpusStore, loader};
use concierge_bot::subsystems::memory::sweeper::spawn_sweeper;
use concierge_bot::subsystems::memory::{MemoryConfig, SessionMemory};
use concierge_bot::subsystems::retrieval::{QueryExpander, Retriever};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), AppError> {
    // Load .env if present; the file is optional.
    let _ = dotenvy::dotenv();

    let config = config::load()?;
    logger::init(&config.log_level, config.log_file.as_deref())?;

    info!(
        bot_name = %config.bot_name,
        documents_dir = %config.corpus.documents_dir.display(),
        provider = %config.llm.provider,
        "config loaded"
    );

    let corpus = Arc::new(load_corpus(&config));

    let provider = providers::build(&config.llm, config.llm_api_key.clone())
        .map_err(|e| AppError::Config(e.to_string()))?;
    match &provider {
        Some(p) => info!(provider = p.name(), "completion provider ready"),
        None => warn!("no completion provider; rewrites fall back to keywords and replies apologise"),
    }

    let expander = QueryExpander::from_prompts_dir(
        provider.clone(),
        config.llm.rewrite,
        &config.agents.prompts_dir,
    );
    let retriever = Arc::new(Retriever::new(corpus, expander, &config.retrieval));

    // Swept or cleared sessions take their rewrite topic with them.
    let topics = Arc::clone(&retriever);
    let memory = Arc::new(
        SessionMemory::new(MemoryConfig {
            history_cap: config.memory.history_cap,
        })
        .with_evict_hook(move |id| {
            topics.expander().forget(id);
        }),
    );
    if let Some(path) = &config.memory.snapshot_path {
        match memory.load_snapshot(path) {
            Ok(n) => info!(sessions = n, "session memory ready"),
            Err(e) => warn!("memory snapshot ignored: {e}"),
        }
    }

    let agent = Arc::new(ConsultingAgent::new(
        Arc::clone(&memory),
        retriever,
        provider,
        &config,
    ));

    let shutdown = CancellationToken::new();
    let sweeper = spawn_sweeper(
        Arc::clone(&memory),
        config.memory.sweep_interval,
        config.memory.idle_timeout,
        shutdown.clone(),
    );

    let ctrl_c_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("ctrl-c received, shutting down");
            ctrl_c_token.cancel();
        }
    });

    let result = run_pty(PtyChannel::new("pty0", agent, Arc::clone(&memory)), shutdown.clone()).await;
    shutdown.cancel();
    if let Err(e) = sweeper.await {
        warn!("sweeper task failed: {e}");
    }

    if let Some(path) = &config.memory.snapshot_path {
        if let Err(e) = memory.save_snapshot(path) {
            warn!("memory snapshot not saved: {e}");
        }
    }

    result
}

/// Documents directory first, then the product feed; a feed record replaces
/// a directory record with the same id and type.
fn load_corpus(config: &Config) -> CorpusStore {
    let store = CorpusStore::new(config.corpus.snippet_radius);
    let mut records = loader::load_dir(&config.corpus.documents_dir);

    if let Some(feed) = &config.corpus.feed_file {
        match loader::load_feed(feed) {
            Ok(feed_records) => records.extend(feed_records),
            Err(e) => warn!("product feed skipped: {e}"),
        }
    }

    let report = store.load(records);
    info!(
        loaded = report.loaded,
        skipped = report.skipped,
        replaced = report.replaced,
        "corpus ready"
    );
    store
}
