//! Corpus value types.
//!
//! * [`SourceRecord`]: loosely-shaped input from a loader or feed.
//! * [`CorpusEntry`]: validated, immutable indexed entry.
//! * [`SearchHit`]: one text-search result.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::fold::FoldedText;
use crate::error::AppError;

// ── Source type ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Text,
    Structured,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Text => "text",
            SourceType::Structured => "structured",
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Entry ────────────────────────────────────────────────────────────────────

/// Payload of a corpus entry.
#[derive(Debug, Clone, PartialEq)]
pub enum EntryBody {
    Text { content: String },
    Structured { fields: BTreeMap<String, String> },
}

/// One indexed document or record. Immutable once built.
#[derive(Debug, Clone)]
pub struct CorpusEntry {
    id: String,
    body: EntryBody,
    /// Text content, or the JSON serialisation of the fields.
    raw_content: String,
    folded: FoldedText,
}

impl CorpusEntry {
    pub fn text(id: impl Into<String>, content: impl Into<String>) -> Self {
        let content = content.into();
        Self::build(id.into(), content.clone(), EntryBody::Text { content })
    }

    pub fn structured(id: impl Into<String>, fields: BTreeMap<String, String>) -> Self {
        // A string-to-string map always serialises.
        let raw = serde_json::to_string(&fields).unwrap_or_default();
        Self::build(id.into(), raw, EntryBody::Structured { fields })
    }

    fn build(id: String, raw_content: String, body: EntryBody) -> Self {
        let folded = FoldedText::new(&raw_content);
        Self { id, body, raw_content, folded }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn body(&self) -> &EntryBody {
        &self.body
    }

    pub fn source_type(&self) -> SourceType {
        match self.body {
            EntryBody::Text { .. } => SourceType::Text,
            EntryBody::Structured { .. } => SourceType::Structured,
        }
    }

    pub fn raw_content(&self) -> &str {
        &self.raw_content
    }

    /// Present iff the entry is structured.
    pub fn structured_fields(&self) -> Option<&BTreeMap<String, String>> {
        match &self.body {
            EntryBody::Structured { fields } => Some(fields),
            EntryBody::Text { .. } => None,
        }
    }

    /// Human label: the `name` field of a structured record, else the id.
    pub fn display_name(&self) -> &str {
        self.structured_fields()
            .and_then(|f| f.get("name"))
            .map(String::as_str)
            .unwrap_or(&self.id)
    }

    pub(crate) fn folded(&self) -> &FoldedText {
        &self.folded
    }
}

// ── Search hit ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchHit {
    pub entry_id: String,
    pub snippet: String,
    /// Occurrences of the query in the entry's content.
    pub relevance: usize,
}

// ── Source record ────────────────────────────────────────────────────────────

/// One record of a corpus feed: `{id|filename, type, content | fields}`.
///
/// Nothing beyond "has content" is enforced until the record is converted
/// into a [`CorpusEntry`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceRecord {
    #[serde(default, alias = "filename")]
    pub id: String,
    /// `"text"` or `"structured"`; inferred from the payload when absent.
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(
        default,
        alias = "structured_data",
        alias = "data",
        skip_serializing_if = "Option::is_none"
    )]
    pub fields: Option<Map<String, Value>>,
}

impl SourceRecord {
    pub fn text(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: Some(SourceType::Text.as_str().into()),
            content: Some(content.into()),
            fields: None,
        }
    }

    pub fn structured(id: impl Into<String>, fields: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            kind: Some(SourceType::Structured.as_str().into()),
            content: None,
            fields: Some(fields),
        }
    }
}

impl TryFrom<SourceRecord> for CorpusEntry {
    type Error = AppError;

    fn try_from(record: SourceRecord) -> Result<Self, Self::Error> {
        let id = record.id.trim();
        if id.is_empty() {
            return Err(AppError::Corpus("record has no id".into()));
        }

        let kind = match record.kind.as_deref() {
            Some("text") => SourceType::Text,
            Some("structured") => SourceType::Structured,
            Some(other) => {
                return Err(AppError::Corpus(format!("record '{id}': unknown type '{other}'")));
            }
            None if record.fields.is_some() => SourceType::Structured,
            None => SourceType::Text,
        };

        match kind {
            SourceType::Text => {
                let content = record
                    .content
                    .filter(|c| !c.trim().is_empty())
                    .ok_or_else(|| AppError::Corpus(format!("record '{id}' has no content")))?;
                Ok(CorpusEntry::text(id, content))
            }
            SourceType::Structured => {
                let fields = record
                    .fields
                    .map(|f| stringify_fields(&f))
                    .filter(|f| !f.is_empty())
                    .ok_or_else(|| AppError::Corpus(format!("record '{id}' has no fields")))?;
                Ok(CorpusEntry::structured(id, fields))
            }
        }
    }
}

/// Flatten JSON values to strings. Nulls are dropped; arrays and objects
/// keep their compact JSON form.
pub(crate) fn stringify_fields(map: &Map<String, Value>) -> BTreeMap<String, String> {
    map.iter()
        .filter_map(|(k, v)| {
            let s = match v {
                Value::Null => return None,
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            Some((k.clone(), s))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn text_record_converts() {
        let entry = CorpusEntry::try_from(SourceRecord::text("thong_tin_son_2k", "Sơn 2K")).unwrap();
        assert_eq!(entry.id(), "thong_tin_son_2k");
        assert_eq!(entry.source_type(), SourceType::Text);
        assert!(entry.structured_fields().is_none());
    }

    #[test]
    fn structured_record_serialises_fields() {
        let record = SourceRecord::structured(
            "son-2k-trang",
            obj(json!({"name": "Sơn 2K Trắng", "price": {"1kg": 200000}, "note": null})),
        );
        let entry = CorpusEntry::try_from(record).unwrap();
        let fields = entry.structured_fields().unwrap();
        assert_eq!(fields["price"], r#"{"1kg":200000}"#);
        assert!(!fields.contains_key("note"));
        assert!(entry.raw_content().contains("Sơn 2K Trắng"));
        assert_eq!(entry.display_name(), "Sơn 2K Trắng");
    }

    #[test]
    fn type_is_inferred_from_payload() {
        let record: SourceRecord =
            serde_json::from_value(json!({"filename": "p1", "data": {"name": "Sơn"}})).unwrap();
        let entry = CorpusEntry::try_from(record).unwrap();
        assert_eq!(entry.source_type(), SourceType::Structured);
        assert_eq!(entry.id(), "p1");
    }

    #[test]
    fn bad_records_are_rejected() {
        let cases = [
            SourceRecord::text("", "content"),
            SourceRecord::text("a", "   "),
            SourceRecord { id: "b".into(), kind: Some("pdf".into()), ..Default::default() },
            SourceRecord::structured("c", Map::new()),
            SourceRecord { id: "d".into(), ..Default::default() },
        ];
        for record in cases {
            assert!(CorpusEntry::try_from(record.clone()).is_err(), "{record:?}");
        }
    }
}
