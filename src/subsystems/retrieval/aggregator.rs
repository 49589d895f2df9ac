//! Merge per-sub-query search results and render the context block.

use std::collections::HashSet;

use serde::Serialize;

use crate::subsystems::corpus::{CorpusEntry, CorpusStore, SearchHit};

/// Returned in place of a context block when nothing matched.
pub const NO_RESULTS: &str = "Không tìm thấy thông tin liên quan trong tài liệu.";

/// Appended after a context block cut at the length limit.
pub const TRUNCATION_MARKER: &str = "\n\n... (Nội dung bị cắt ngắn)";

const TEXT_LABEL: &str = "THÔNG TIN TỪ TÀI LIỆU:";
const STRUCTURED_LABEL: &str = "THÔNG TIN SẢN PHẨM:";

/// How many hits to request and keep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GatherLimits {
    /// Passed as `limit` to both searches for every sub-query.
    pub per_query_limit: usize,
    pub text_cap: usize,
    pub structured_cap: usize,
}

impl Default for GatherLimits {
    fn default() -> Self {
        Self { per_query_limit: 2, text_cap: 3, structured_cap: 3 }
    }
}

/// Deduplicated hits across all sub-queries.
#[derive(Debug, Clone, Default)]
pub struct GatheredContext {
    /// Ranked by relevance, descending.
    pub text_hits: Vec<SearchHit>,
    /// In discovery order.
    pub structured_hits: Vec<CorpusEntry>,
}

/// Run both searches for every sub-query and merge.
///
/// An entry is kept the first time it is found; later sub-queries that hit
/// it again are ignored, relevance included.
pub fn gather(corpus: &CorpusStore, sub_queries: &[String], limits: GatherLimits) -> GatheredContext {
    let mut seen_text = HashSet::new();
    let mut seen_structured = HashSet::new();
    let mut out = GatheredContext::default();

    for query in sub_queries {
        for hit in corpus.search_text(query, limits.per_query_limit) {
            if seen_text.insert(hit.entry_id.clone()) {
                out.text_hits.push(hit);
            }
        }
        for entry in corpus.search_structured(query, limits.per_query_limit) {
            if seen_structured.insert(entry.id().to_string()) {
                out.structured_hits.push(entry);
            }
        }
    }

    out.text_hits.sort_by(|a, b| b.relevance.cmp(&a.relevance));
    out.text_hits.truncate(limits.text_cap);
    out.structured_hits.truncate(limits.structured_cap);

    tracing::debug!(
        sub_queries = sub_queries.len(),
        text = out.text_hits.len(),
        structured = out.structured_hits.len(),
        "retrieval gathered"
    );
    out
}

impl GatheredContext {
    pub fn is_empty(&self) -> bool {
        self.text_hits.is_empty() && self.structured_hits.is_empty()
    }

    /// Labeled text block, then labeled product block, cut to `max_length`
    /// chars. [`NO_RESULTS`] when empty.
    pub fn render(&self, max_length: usize) -> String {
        if self.is_empty() {
            return NO_RESULTS.to_string();
        }

        let mut out = String::new();

        if !self.text_hits.is_empty() {
            out.push_str(TEXT_LABEL);
            out.push_str("\n\n");
            for hit in &self.text_hits {
                out.push_str(&format!("[{}]\n{}\n\n", hit.entry_id, hit.snippet));
            }
        }

        if !self.structured_hits.is_empty() {
            out.push_str(STRUCTURED_LABEL);
            out.push_str("\n\n");
            for entry in &self.structured_hits {
                out.push_str(&format!("- {}:\n", entry.display_name()));
                for (key, value) in entry.structured_fields().into_iter().flatten() {
                    if key != "id" && key != "name" {
                        out.push_str(&format!("  {key}: {value}\n"));
                    }
                }
                out.push('\n');
            }
        }

        let out = out.trim_end();
        match out.char_indices().nth(max_length) {
            Some((cut, _)) => format!("{}{TRUNCATION_MARKER}", &out[..cut]),
            None => out.to_string(),
        }
    }
}
