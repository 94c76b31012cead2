// src/ingest/sources/guardian.rs
use super::{category_labels, guid_text};
use crate::ingest::normalize::{pick_published_at, strip_html};
use crate::ingest::types::{NormalizedArticle, RssItem, RssSource};

fn map_item(item: &RssItem) -> Option<NormalizedArticle> {
    let title = item.title.as_deref()?.trim();
    let link = item.link.as_deref()?.trim();
    if title.is_empty() || link.is_empty() {
        return None;
    }

    Some(NormalizedArticle {
        source: "guardian".to_string(),
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
            .media_content
            .first()
            .and_then(|media| media.url.clone()),
    })
}

pub const GUARDIAN: RssSource = RssSource {
    id: "guardian",
    url: "https://www.theguardian.com/world/rss",
    supports_extraction: true,
    headers: None,
    map_item,
};
