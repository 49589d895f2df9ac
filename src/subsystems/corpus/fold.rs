//! Case folding with a way back to source positions.
//!
//! Lowercasing can change the number of chars (`'İ'` folds to two), so a
//! match offset in the folded text is not a valid offset in the source.
//! [`FoldedText`] keeps, for every folded char, the index of the source char
//! it came from.

/// Lowercased copy of a source string plus a folded → source position map.
#[derive(Debug, Clone, Default)]
pub(crate) struct FoldedText {
    folded: String,
    /// `(byte offset in folded, char index in source)`, one per folded char.
    origin: Vec<(usize, usize)>,
}

impl FoldedText {
    pub(crate) fn new(source: &str) -> Self {
        let mut folded = String::with_capacity(source.len());
        let mut origin = Vec::with_capacity(source.len());
        for (char_idx, c) in source.chars().enumerate() {
            for lower in c.to_lowercase() {
                origin.push((folded.len(), char_idx));
                folded.push(lower);
            }
        }
        Self { folded, origin }
    }

    pub(crate) fn contains(&self, needle: &str) -> bool {
        self.folded.contains(needle)
    }

    /// Non-overlapping occurrences of an already-folded `needle`.
    pub(crate) fn count(&self, needle: &str) -> usize {
        self.folded.matches(needle).count()
    }

    /// Source char index of the first occurrence of an already-folded `needle`.
    pub(crate) fn find_source_char(&self, needle: &str) -> Option<usize> {
        let byte = self.folded.find(needle)?;
        self.origin
            .binary_search_by_key(&byte, |&(b, _)| b)
            .ok()
            .map(|i| self.origin[i].1)
    }
}

/// Fold a query the same way [`FoldedText`] folds content. Surrounding
/// whitespace is dropped.
pub(crate) fn fold_query(query: &str) -> String {
    query.trim().chars().flat_map(char::to_lowercase).collect()
}

/// Up to `radius` chars either side of source char `at`, trimmed.
///
/// The window is anchored on the match start, so the tail covers the match
/// itself plus whatever follows it.
pub(crate) fn snippet_around(source: &str, at: usize, radius: usize) -> String {
    let start = at.saturating_sub(radius);
    let end = at.saturating_add(radius);
    let window: String = source.chars().skip(start).take(end - start).collect();
    window.trim().to_string()
}
