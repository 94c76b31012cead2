// src/ingest/sources/aljazeera.rs
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
        source: "aljazeera".to_string(),
        title: title.to_string(),
        link: link.to_string(),
        summary: strip_html(item.description.as_deref().unwrap_or("")),
        content: None,
        published_at: pick_published_at(&item.date_candidates()),
        guid: guid_text(item.guid.as_ref()),
        authors: Vec::new(),
        categories: category_labels(&item.categories),
        image_url: None,
    })
}

pub const ALJAZEERA: RssSource = RssSource {
    id: "aljazeera",
    url: "https://www.aljazeera.com/xml/rss/all.xml",
    supports_extraction: true,
    headers: None,
    map_item,
};
