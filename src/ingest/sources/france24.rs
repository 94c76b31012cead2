// src/ingest/sources/france24.rs
// france24.com rejects bare fetches; the extractor sends an extended
// browser-style header set for this source.
use super::{category_labels, guid_text};
use crate::ingest::normalize::{pick_published_at, strip_html};
use crate::ingest::types::{NormalizedArticle, RssItem, RssSource};

const EXTRACTION_HEADERS: &[(&str, &str)] = &[
    ("accept-language", "en-US,en;q=0.9"),
    ("cache-control", "no-cache"),
    ("pragma", "no-cache"),
    ("sec-fetch-dest", "document"),
    ("sec-fetch-mode", "navigate"),
    ("sec-fetch-site", "none"),
    ("upgrade-insecure-requests", "1"),
];

fn map_item(item: &RssItem) -> Option<NormalizedArticle> {
    let title = item.title.as_deref()?.trim();
    let link = item.link.as_deref()?.trim();
    if title.is_empty() || link.is_empty() {
        return None;
    }

    Some(NormalizedArticle {
        source: "france24".to_string(),
        title: title.to_string(),
        link: link.to_string(),
        summary: strip_html(item.description.as_deref().unwrap_or("")),
        content: None,
        published_at: pick_published_at(&item.date_candidates()),
        guid: guid_text(item.guid.as_ref()),
        authors: item
            .creators
            .iter()
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .collect(),
        categories: category_labels(&item.categories),
        image_url: item
            .media_thumbnail
            .as_ref()
            .and_then(|media| media.url.clone())
            .or_else(|| item.enclosure.as_ref().and_then(|e| e.url.clone())),
    })
}

pub const FRANCE24: RssSource = RssSource {
    id: "france24",
    url: "https://www.france24.com/en/rss",
    supports_extraction: true,
    headers: Some(EXTRACTION_HEADERS),
    map_item,
};
