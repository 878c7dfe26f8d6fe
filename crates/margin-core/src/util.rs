//! Shared utility functions used across multiple modules.

use chrono::{SecondsFormat, Utc};

/// Normalize optional text by trimming whitespace and removing empties.
///
/// Returns `None` when the input is `None` or the trimmed value is empty.
pub fn normalize_text_option(value: Option<String>) -> Option<String> {
    let value = value?;
    let value = value.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Check if a string starts with `http://` or `https://`.
pub fn is_http_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

/// Truncate text to at most 180 characters for error messages.
pub fn compact_text(value: &str) -> String {
    value.trim().chars().take(180).collect()
}

/// Current UTC time as ISO-8601 with millisecond precision (`2024-01-01T00:00:00.000Z`).
pub fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Number of chars in `value`.
pub fn char_len(value: &str) -> usize {
    value.chars().count()
}

/// Slice `value` by char offsets, clamping both ends to the string length.
pub fn char_slice(value: &str, start: usize, end: usize) -> String {
    if end <= start {
        return String::new();
    }
    value.chars().skip(start).take(end - start).collect()
}

/// Collapse whitespace runs to single spaces and trim both ends.
pub fn collapse_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}
