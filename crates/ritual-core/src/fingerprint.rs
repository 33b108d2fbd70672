//! Semantic identity for records that arrive from several sources with
//! different ids (offline drafts reconciled against remote rows).

use sha2::{Digest, Sha256};

use crate::model::{EchoRecord, JournalEntry};

const PLACEHOLDER_TITLES: &[&str] = &["untitled", "unknown", "unknown title", "loading...", "n/a"];

/// Lowercase, trim, and collapse internal whitespace runs to one space.
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn is_placeholder_title(title: &str) -> bool {
    let title = normalize_text(title);
    title.is_empty() || PLACEHOLDER_TITLES.contains(&title.as_str())
}

/// Subject id when present, else a usable title, else the entry id.
pub fn subject_identity(entry: &JournalEntry) -> String {
    let subject = entry.subject_id.trim();
    if !subject.is_empty() {
        return format!("subject:{}", subject.to_lowercase());
    }
    if !is_placeholder_title(&entry.subject_title) {
        return format!("title:{}", normalize_text(&entry.subject_title));
    }
    format!("id:{}", entry.id.trim())
}

/// Hex digest of `(date, subject identity, normalized text)`.
pub fn entry_fingerprint(entry: &JournalEntry) -> String {
    let mut hasher = Sha256::new();
    hasher.update(entry.date.to_string().as_bytes());
    hasher.update([0u8]);
    hasher.update(subject_identity(entry).as_bytes());
    hasher.update([0u8]);
    hasher.update(normalize_text(&entry.text).as_bytes());
    hex::encode(hasher.finalize())
}

pub fn echo_fingerprint(echo: &EchoRecord) -> String {
    match echo.id.as_deref().map(str::trim) {
        Some(id) if !id.is_empty() => format!("id:{id}"),
        _ => format!("title:{}|{}", normalize_text(&echo.title), echo.date),
    }
}
