//! Retrieval subsystem: utterance to context block.
//!
//! [`Retriever::get_context`] chains the [`QueryExpander`] and the
//! aggregator over a shared [`CorpusStore`]. No lock is held while the
//! expander waits on the completion provider.

pub mod aggregator;
pub mod expander;

pub use aggregator::{GatherLimits, GatheredContext, NO_RESULTS, TRUNCATION_MARKER};
pub use expander::{ExpandedQuerySet, ExpansionSource, QueryExpander, TopicContext};

use std::sync::Arc;

use tracing::info;

use crate::config::RetrievalConfig;
use crate::subsystems::corpus::CorpusStore;

pub struct Retriever {
    corpus: Arc<CorpusStore>,
    expander: QueryExpander,
    limits: GatherLimits,
    default_max_length: usize,
}

impl Retriever {
    pub fn new(corpus: Arc<CorpusStore>, expander: QueryExpander, config: &RetrievalConfig) -> Self {
        Self {
            corpus,
            expander,
            limits: GatherLimits {
                per_query_limit: config.per_query_limit,
                text_cap: config.text_cap,
                structured_cap: config.structured_cap,
            },
            default_max_length: config.max_context_length,
        }
    }

    /// Context block for `query`, at most `max_length` chars plus the
    /// truncation marker. Returns [`NO_RESULTS`] when nothing matched.
    pub async fn get_context(&self, query: &str, session_id: &str, max_length: usize) -> String {
        let expanded = self.expander.expand(query, session_id).await;
        let gathered = aggregator::gather(&self.corpus, &expanded.sub_queries, self.limits);
        let rendered = gathered.render(max_length);

        info!(
            %session_id,
            source = ?expanded.source,
            sub_queries = expanded.sub_queries.len(),
            text_hits = gathered.text_hits.len(),
            structured_hits = gathered.structured_hits.len(),
            chars = rendered.chars().count(),
            "context built"
        );
        rendered
    }

    /// [`get_context`](Self::get_context) with the configured length limit.
    pub async fn context_for(&self, query: &str, session_id: &str) -> String {
        self.get_context(query, session_id, self.default_max_length).await
    }

    pub fn expander(&self) -> &QueryExpander {
        &self.expander
    }

    pub fn corpus(&self) -> &Arc<CorpusStore> {
        &self.corpus
    }
}

impl std::fmt::Debug for Retriever {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Retriever")
            .field("corpus", &self.corpus)
            .field("expander", &self.expander)
            .field("limits", &self.limits)
            .field("default_max_length", &self.default_max_length)
            .finish()
    }
}
