//! Turn files on disk into [`SourceRecord`]s.
//!
//! Directory layout is free-form; files are visited recursively in path
//! order. Per extension:
//!
//! | ext     | text record                 | structured records                  |
//! |---------|-----------------------------|-------------------------------------|
//! | `.txt`  | file content                | none                                |
//! | `.json` | pretty-printed JSON         | array items / `products` items      |
//! | `.csv`  | rows as pretty-printed JSON | rows                                |
//! | `.pdf`  | page text with page markers | none                                |
//!
//! `.pdf` needs the `format-pdf` feature; without it PDFs count as
//! unsupported. A structured record needs an `id` or `name` key, which
//! becomes its id. A file that cannot be read or parsed is logged and
//! skipped, as is a directory that cannot be listed. Symlinked directories
//! are not followed.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use tracing::{debug, error, info, warn};

use super::types::SourceRecord;
use crate::error::AppError;

/// Load every supported file under `dir`. A missing directory yields nothing.
pub fn load_dir(dir: &Path) -> Vec<SourceRecord> {
    if !dir.is_dir() {
        warn!(dir = %dir.display(), "documents directory not found");
        return Vec::new();
    }

    let mut paths = Vec::new();
    collect_files(dir, &mut paths);
    paths.sort();

    let mut records = Vec::new();
    for path in &paths {
        match load_file(path) {
            Ok(Some(mut file_records)) => records.append(&mut file_records),
            Ok(None) => debug!(path = %path.display(), "unsupported extension, skipped"),
            Err(e) => error!(path = %path.display(), "skipping file: {e}"),
        }
    }

    info!(
        dir = %dir.display(),
        files = paths.len(),
        records = records.len(),
        "documents scanned"
    );
    records
}

/// Read a JSON feed: an array of [`SourceRecord`] objects. Items that do not
/// deserialize are skipped individually.
pub fn load_feed(path: &Path) -> Result<Vec<SourceRecord>, AppError> {
    let data = fs::read_to_string(path)
        .map_err(|e| AppError::Corpus(format!("cannot read feed {}: {e}", path.display())))?;
    let items: Vec<Value> = serde_json::from_str(&data)
        .map_err(|e| AppError::Corpus(format!("feed {} is not a JSON array: {e}", path.display())))?;

    let total = items.len();
    let records: Vec<SourceRecord> = items
        .into_iter()
        .enumerate()
        .filter_map(|(i, item)| match serde_json::from_value(item) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(feed = %path.display(), index = i, "skipping feed item: {e}");
                None
            }
        })
        .collect();

    info!(feed = %path.display(), total, accepted = records.len(), "feed read");
    Ok(records)
}

fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            error!(dir = %dir.display(), "cannot scan directory: {e}");
            return;
        }
    };

    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(dir = %dir.display(), "skipping unreadable entry: {e}");
                continue;
            }
        };
        let path = entry.path();
        let file_type = match entry.file_type() {
            Ok(t) => t,
            Err(e) => {
                warn!(path = %path.display(), "skipping entry: {e}");
                continue;
            }
        };

        if file_type.is_symlink() {
            // Symlinked files are read; symlinked directories may loop.
            if path.is_file() {
                out.push(path);
            } else {
                debug!(path = %path.display(), "symlink not followed");
            }
        } else if file_type.is_dir() {
            collect_files(&path, out);
        } else if file_type.is_file() {
            out.push(path);
        }
    }
}

/// `Ok(None)` for an unsupported extension.
fn load_file(path: &Path) -> Result<Option<Vec<SourceRecord>>, AppError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_string();

    let records = match ext.as_str() {
        "txt" => vec![SourceRecord::text(stem, read(path)?)],
        "json" => {
            let value: Value = serde_json::from_str(&read(path)?)
                .map_err(|e| AppError::Corpus(format!("invalid JSON: {e}")))?;
            json_records(stem, &value)?
        }
        "csv" => csv_records(stem, &read(path)?)?,
        #[cfg(feature = "format-pdf")]
        "pdf" => vec![SourceRecord::text(stem, pdf_text(path)?)],
        _ => return Ok(None),
    };

    debug!(path = %path.display(), records = records.len(), "file loaded");
    Ok(Some(records))
}

fn read(path: &Path) -> Result<String, AppError> {
    fs::read_to_string(path).map_err(|e| AppError::Corpus(format!("cannot read: {e}")))
}

/// Text of every page, each preceded by a `--- Trang N ---` marker. A page
/// whose text cannot be extracted is logged and left empty.
#[cfg(feature = "format-pdf")]
fn pdf_text(path: &Path) -> Result<String, AppError> {
    let doc = lopdf::Document::load(path)
        .map_err(|e| AppError::Corpus(format!("invalid PDF: {e}")))?;

    let mut text = String::new();
    for page in doc.get_pages().into_keys() {
        text.push_str(&format!("\n--- Trang {page} ---\n"));
        match doc.extract_text(&[page]) {
            Ok(page_text) => text.push_str(&page_text),
            Err(e) => warn!(path = %path.display(), page, "no text extracted: {e}"),
        }
        text.push('\n');
    }
    Ok(text)
}

fn json_records(stem: String, value: &Value) -> Result<Vec<SourceRecord>, AppError> {
    let pretty = serde_json::to_string_pretty(value)
        .map_err(|e| AppError::Corpus(format!("cannot render JSON: {e}")))?;

    let items: &[Value] = match value {
        Value::Array(items) => items.as_slice(),
        Value::Object(map) => match map.get("products") {
            Some(Value::Array(items)) => items.as_slice(),
            _ => &[],
        },
        _ => &[],
    };

    let mut records = vec![SourceRecord::text(stem, pretty)];
    records.extend(
        items
            .iter()
            .filter_map(Value::as_object)
            .filter_map(|obj| structured_record(obj.clone())),
    );
    Ok(records)
}

fn csv_records(stem: String, data: &str) -> Result<Vec<SourceRecord>, AppError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(data.as_bytes());

    let headers = reader
        .headers()
        .map_err(|e| AppError::Corpus(format!("invalid CSV header: {e}")))?
        .clone();

    let mut rows = Vec::new();
    for row in reader.records() {
        let row = row.map_err(|e| AppError::Corpus(format!("invalid CSV row: {e}")))?;
        let obj: Map<String, Value> = headers
            .iter()
            .zip(row.iter())
            .map(|(h, v)| (h.to_string(), Value::String(v.to_string())))
            .collect();
        rows.push(obj);
    }

    let pretty = serde_json::to_string_pretty(&rows)
        .map_err(|e| AppError::Corpus(format!("cannot render CSV rows: {e}")))?;

    let mut records = vec![SourceRecord::text(stem, pretty)];
    records.extend(rows.into_iter().filter_map(structured_record));
    Ok(records)
}

/// A product-like object keyed by its `id`, falling back to `name`.
fn structured_record(obj: Map<String, Value>) -> Option<SourceRecord> {
    let key = ["id", "name"].iter().find_map(|k| match obj.get(*k)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })?;
    Some(SourceRecord::structured(key, obj))
}
