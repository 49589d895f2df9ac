//! Corpus subsystem: in-memory document and product index.
//!
//! The store holds an `Arc<Vec<CorpusEntry>>` behind an `RwLock`. Searches
//! clone the `Arc` under a brief read lock and scan without holding it;
//! [`CorpusStore::load`] builds the replacement vector first and swaps it in
//! under the write lock. A reader therefore sees the old corpus or the new
//! one, never a mix.

mod fold;
pub mod loader;
pub mod types;

pub use types::{CorpusEntry, EntryBody, SearchHit, SourceRecord, SourceType};

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use serde::Serialize;
use tracing::{debug, info, warn};

use fold::{fold_query, snippet_around};

/// Chars kept either side of the first match when snippeting.
pub const DEFAULT_SNIPPET_RADIUS: usize = 200;

/// Outcome of a [`CorpusStore::load`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    /// Entries in the new corpus.
    pub loaded: usize,
    /// Records rejected during conversion.
    pub skipped: usize,
    /// Records that replaced an earlier record with the same type and id.
    pub replaced: usize,
}

pub struct CorpusStore {
    entries: RwLock<Arc<Vec<CorpusEntry>>>,
    snippet_radius: usize,
}

impl CorpusStore {
    pub fn new(snippet_radius: usize) -> Self {
        Self {
            entries: RwLock::new(Arc::new(Vec::new())),
            snippet_radius,
        }
    }

    /// Replace the whole corpus with `records`.
    ///
    /// A record that fails to convert is logged and skipped. A later record
    /// with the same type and id as an earlier one takes its slot.
    pub fn load<I>(&self, records: I) -> LoadReport
    where
        I: IntoIterator<Item = SourceRecord>,
    {
        let mut report = LoadReport::default();
        let mut entries: Vec<CorpusEntry> = Vec::new();
        let mut slots: HashMap<(SourceType, String), usize> = HashMap::new();

        for record in records {
            let record_id = record.id.clone();
            let entry = match CorpusEntry::try_from(record) {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(record_id = %record_id, "corpus record skipped: {e}");
                    report.skipped += 1;
                    continue;
                }
            };

            let key = (entry.source_type(), entry.id().to_string());
            match slots.get(&key) {
                Some(&slot) => {
                    debug!(entry_id = %entry.id(), "duplicate corpus id replaced");
                    entries[slot] = entry;
                    report.replaced += 1;
                }
                None => {
                    slots.insert(key, entries.len());
                    entries.push(entry);
                }
            }
        }

        report.loaded = entries.len();
        let new = Arc::new(entries);
        *self.entries.write().unwrap_or_else(PoisonError::into_inner) = new;

        info!(
            loaded = report.loaded,
            skipped = report.skipped,
            replaced = report.replaced,
            "corpus loaded"
        );
        report
    }

    /// Current corpus. Stays valid across later reloads.
    pub fn snapshot(&self) -> Arc<Vec<CorpusEntry>> {
        Arc::clone(&self.entries.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Case-insensitive substring search over text entries.
    ///
    /// One hit per matching entry, snippeted around the first occurrence and
    /// ranked by occurrence count (ties keep corpus order). At most `limit`.
    pub fn search_text(&self, query: &str, limit: usize) -> Vec<SearchHit> {
        let needle = fold_query(query);
        if needle.is_empty() || limit == 0 {
            return Vec::new();
        }

        let entries = self.snapshot();
        let mut hits: Vec<SearchHit> = entries
            .iter()
            .filter_map(|entry| match entry.body() {
                EntryBody::Text { content } => {
                    let at = entry.folded().find_source_char(&needle)?;
                    Some(SearchHit {
                        entry_id: entry.id().to_string(),
                        snippet: snippet_around(content, at, self.snippet_radius),
                        relevance: entry.folded().count(&needle),
                    })
                }
                EntryBody::Structured { .. } => None,
            })
            .collect();

        // Stable: equal relevance keeps corpus order.
        hits.sort_by(|a, b| b.relevance.cmp(&a.relevance));
        hits.truncate(limit);
        debug!(query, hits = hits.len(), "text search");
        hits
    }

    /// Case-insensitive substring search over the serialised fields of
    /// structured entries. Matches come back whole, in corpus order.
    pub fn search_structured(&self, query: &str, limit: usize) -> Vec<CorpusEntry> {
        let needle = fold_query(query);
        if needle.is_empty() || limit == 0 {
            return Vec::new();
        }

        let entries = self.snapshot();
        let hits: Vec<CorpusEntry> = entries
            .iter()
            .filter(|entry| match entry.body() {
                EntryBody::Structured { .. } => entry.folded().contains(&needle),
                EntryBody::Text { .. } => false,
            })
            .take(limit)
            .cloned()
            .collect();
        debug!(query, hits = hits.len(), "structured search");
        hits
    }

    /// First entry with this id, text entries before structured ones.
    pub fn get(&self, id: &str) -> Option<CorpusEntry> {
        let entries = self.snapshot();
        let mut matching = entries.iter().filter(|e| e.id() == id);
        let first = matching.next()?;
        match first.source_type() {
            SourceType::Text => Some(first.clone()),
            SourceType::Structured => Some(
                matching
                    .find(|e| e.source_type() == SourceType::Text)
                    .unwrap_or(first)
                    .clone(),
            ),
        }
    }

    pub fn ids(&self) -> Vec<String> {
        self.snapshot().iter().map(|e| e.id().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }
}

impl Default for CorpusStore {
    fn default() -> Self {
        Self::new(DEFAULT_SNIPPET_RADIUS)
    }
}

impl std::fmt::Debug for CorpusStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CorpusStore")
            .field("entries", &self.len())
            .field("snippet_radius", &self.snippet_radius)
            .finish()
    }
}
