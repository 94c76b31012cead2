// src/ingest/types.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One article after per-source mapping. `link` is the canonical identity
/// used for dedup and for the idempotent upsert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedArticle {
    pub source: String,
    pub title: String,
    pub link: String,
    pub summary: String,
    pub content: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub guid: Option<String>,
    pub authors: Vec<String>,
    pub categories: Vec<String>,
    pub image_url: Option<String>,
}

/// Typed view of one RSS 2.0 `<item>`. quick-xml's serde deserializer
/// exposes namespaced elements by their local name, so `dc:creator`
/// arrives as `creator` and `media:thumbnail` as `thumbnail`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RssItem {
    pub title: Option<String>,
    pub link: Option<String>,
    pub description: Option<String>,
    #[serde(rename = "pubDate")]
    pub pub_date: Option<String>,
    #[serde(rename = "date")]
    pub dc_date: Option<String>,
    pub updated: Option<String>,
    pub guid: Option<TextValue>,
    pub author: Option<String>,
    #[serde(rename = "creator")]
    pub creators: Vec<String>,
    #[serde(rename = "category")]
    pub categories: Vec<TextValue>,
    #[serde(rename = "thumbnail")]
    pub media_thumbnail: Option<MediaRef>,
    #[serde(rename = "content")]
    pub media_content: Vec<MediaRef>,
    pub enclosure: Option<MediaRef>,
}

impl RssItem {
    /// First usable publish timestamp in feed-preference order.
    pub fn date_candidates(&self) -> [Option<&str>; 3] {
        [
            self.pub_date.as_deref(),
            self.dc_date.as_deref(),
            self.updated.as_deref(),
        ]
    }
}

/// Element that may carry attributes next to its text (`<guid
/// isPermaLink="false">…</guid>`, `<category domain="…">…</category>`).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TextValue {
    #[serde(rename = "$text")]
    pub value: Option<String>,
}

impl TextValue {
    pub fn text(&self) -> &str {
        self.value.as_deref().unwrap_or("")
    }
}

/// `media:content` / `media:thumbnail` / `enclosure`: only the URL matters.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MediaRef {
    #[serde(rename = "@url")]
    pub url: Option<String>,
}

/// A feed as data plus a pure mapping function. New sources are added by
/// providing another record, not by implementing a hierarchy.
#[derive(Debug, Clone)]
pub struct RssSource {
    pub id: &'static str,
    pub url: &'static str,
    /// Whether full-page extraction is worth attempting for this source.
    pub supports_extraction: bool,
    /// Extra request headers for the article page fetch, when the source
    /// needs a more browser-like handshake.
    pub headers: Option<&'static [(&'static str, &'static str)]>,
    pub map_item: fn(&RssItem) -> Option<NormalizedArticle>,
}
