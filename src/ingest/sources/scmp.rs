// src/ingest/sources/scmp.rs
use super::{category_labels, guid_text};
use crate::ingest::normalize::{pick_published_at, strip_html};
use crate::ingest::types::{NormalizedArticle, RssItem, RssSource};

fn map_item(item: &RssItem) -> Option<NormalizedArticle> {
    let title = item.title.as_deref()?.trim();
    let link = item.link.as_deref()?.trim();
    if title.is_empty() || link.is_empty() {
        return None;
    }

    let mut authors: Vec<String> = item
        .creators
        .iter()
        .map(|name| name.trim().to_string())
        .collect();
    if let Some(author) = item.author.as_deref() {
        authors.push(author.trim().to_string());
    }
    authors.retain(|name| !name.is_empty());

    Some(NormalizedArticle {
        source: "scmp".to_string(),
        title: title.to_string(),
        link: link.to_string(),
        summary: strip_html(item.description.as_deref().unwrap_or("")),
        content: None,
        published_at: pick_published_at(&item.date_candidates()),
        guid: guid_text(item.guid.as_ref()),
        authors,
        categories: category_labels(&item.categories),
        image_url: item
            .media_content
            .first()
            .and_then(|media| media.url.clone())
            .or_else(|| item.enclosure.as_ref().and_then(|e| e.url.clone())),
    })
}

pub const SCMP: RssSource = RssSource {
    id: "scmp",
    url: "https://www.scmp.com/rss/91/feed/",
    supports_extraction: true,
    headers: None,
    map_item,
};
