// src/ingest/normalize.rs
// Shared text cleanup for feed fields: tag stripping, entity decoding,
// whitespace collapsing, and lenient date parsing.

use chrono::{DateTime, Utc};
use once_cell::sync::OnceCell;
use regex::Regex;

/// Collapse all whitespace runs to single spaces and trim.
pub fn normalize_whitespace(s: &str) -> String {
    static RE_WS: OnceCell<Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| Regex::new(r"\s+").unwrap());
    re_ws.replace_all(s, " ").trim().to_string()
}

/// Strip HTML tags, decode entities, collapse whitespace. Feed
/// descriptions routinely embed markup and `&amp;`-style entities.
pub fn strip_html(s: &str) -> String {
    static RE_TAGS: OnceCell<Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| Regex::new(r"(?is)</?[^>]+>").unwrap());
    let without_tags = re_tags.replace_all(s, " ");
    let decoded = html_escape::decode_html_entities(&without_tags).to_string();
    normalize_whitespace(&decoded)
}

/// Parse a feed timestamp: RFC 2822 (`Tue, 02 Sep 2025 …`) first, then
/// RFC 3339. Anything else is treated as absent.
pub fn parse_feed_date(value: &str) -> Option<DateTime<Utc>> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    DateTime::parse_from_rfc2822(trimmed)
        .or_else(|_| DateTime::parse_from_rfc3339(trimmed))
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// First parseable date among the candidates, in order.
pub fn pick_published_at(candidates: &[Option<&str>]) -> Option<DateTime<Utc>> {
    candidates
        .iter()
        .flatten()
        .find_map(|value| parse_feed_date(value))
}
