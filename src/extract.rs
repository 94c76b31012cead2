// src/extract.rs
// Full-page article extraction. Never errors past this boundary: any
// fetch, parse, or quality failure is `None` and the caller falls back to
// the feed summary.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, USER_AGENT};
use scraper::{Html, Selector};
use tracing::debug;

use crate::ingest::normalize::normalize_whitespace;

pub const DEFAULT_EXTRACT_TIMEOUT: Duration = Duration::from_secs(15);
pub const DEFAULT_MIN_TEXT_CHARS: usize = 200;

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
     AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Safari/605.1.15";

/// Result of a successful extraction: normalized body text, and the page
/// title when one was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extracted {
    pub text: String,
    pub title: Option<String>,
}

#[async_trait]
pub trait ArticleExtractor: Send + Sync {
    /// Fetch `url` and return its main-body text, or `None` when the page
    /// is unreachable or extraction is unreliable.
    async fn extract(&self, url: &str, headers: Option<&[(&str, &str)]>) -> Option<Extracted>;
}

pub struct HttpArticleExtractor {
    client: reqwest::Client,
    min_text_chars: usize,
}

impl HttpArticleExtractor {
    pub fn new(timeout: Duration, min_text_chars: usize) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()?;
        Ok(Self {
            client,
            min_text_chars,
        })
    }

    fn request_headers(overrides: Option<&[(&str, &str)]>) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml"),
        );
        if let Some(overrides) = overrides {
            for (name, value) in overrides {
                let parsed_name = name.parse::<HeaderName>();
                let parsed_value = HeaderValue::from_str(value);
                if let (Ok(name), Ok(value)) = (parsed_name, parsed_value) {
                    headers.insert(name, value);
                }
            }
        }
        headers
    }
}

#[async_trait]
impl ArticleExtractor for HttpArticleExtractor {
    async fn extract(&self, url: &str, headers: Option<&[(&str, &str)]>) -> Option<Extracted> {
        let response = match self
            .client
            .get(url)
            .headers(Self::request_headers(headers))
            .send()
            .await
        {
            Ok(response) => response,
            Err(err) => {
                debug!(url, error = %err, "article fetch failed");
                return None;
            }
        };

        if !response.status().is_success() {
            debug!(url, status = %response.status(), "article fetch non-success");
            return None;
        }

        let html = match response.text().await {
            Ok(html) => html,
            Err(err) => {
                debug!(url, error = %err, "article body read failed");
                return None;
            }
        };

        let extracted = extract_from_html(&html, self.min_text_chars);
        if extracted.is_none() {
            debug!(url, "extraction produced no usable text");
        }
        extracted
    }
}

// Containers tried in order before falling back to all paragraphs.
const MAIN_CONTENT_SELECTORS: &[&str] = &[
    "article",
    "main",
    "[role='main']",
    "#content",
    "#main",
    ".article-body",
    ".post-content",
    ".entry-content",
    ".content",
];

/// Readability-style heuristic over a parsed document: pick the first
/// main-content container, join its paragraph text, and require a minimum
/// length after whitespace normalization.
pub fn extract_from_html(html: &str, min_text_chars: usize) -> Option<Extracted> {
    let document = Html::parse_document(html);
    let paragraph = Selector::parse("p").ok()?;

    let mut text = String::new();
    for selector_str in MAIN_CONTENT_SELECTORS {
        let Ok(selector) = Selector::parse(selector_str) else {
            continue;
        };
        if let Some(container) = document.select(&selector).next() {
            text = collect_paragraphs(container.select(&paragraph));
            if !text.is_empty() {
                break;
            }
        }
    }
    if text.is_empty() {
        text = collect_paragraphs(document.select(&paragraph));
    }

    let text = normalize_whitespace(&text);
    if text.chars().count() < min_text_chars {
        return None;
    }

    Some(Extracted {
        text,
        title: page_title(&document),
    })
}

fn collect_paragraphs<'a>(paragraphs: impl Iterator<Item = scraper::ElementRef<'a>>) -> String {
    paragraphs
        .map(|p| p.text().collect::<String>())
        .filter(|chunk| !chunk.trim().is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn page_title(document: &Html) -> Option<String> {
    let title_selector = Selector::parse("title").ok()?;
    document
        .select(&title_selector)
        .next()
        .map(|el| normalize_whitespace(&el.text().collect::<String>()))
        .filter(|title| !title.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(body: &str) -> String {
        format!("<html><head><title> Page \n Title </title></head><body>{body}</body></html>")
    }

    #[test]
    fn prefers_article_container_over_boilerplate() {
        let long = "word ".repeat(60);
        let html = page(&format!(
            "<nav><p>menu menu menu</p></nav><article><p>{long}</p></article>"
        ));
        let extracted = extract_from_html(&html, 200).unwrap();
        assert!(extracted.text.starts_with("word word"));
        assert!(!extracted.text.contains("menu"));
        assert_eq!(extracted.title.as_deref(), Some("Page Title"));
    }

    #[test]
    fn short_text_is_discarded() {
        let html = page("<article><p>too short</p></article>");
        assert!(extract_from_html(&html, 200).is_none());
    }

    #[test]
    fn falls_back_to_all_paragraphs_without_container() {
        let long = "sentence ".repeat(40);
        let html = page(&format!("<div><p>{long}</p></div>"));
        let extracted = extract_from_html(&html, 200).unwrap();
        assert!(extracted.text.contains("sentence"));
    }

    #[test]
    fn whitespace_is_collapsed() {
        let filler = "x ".repeat(150);
        let html = page(&format!("<article><p>a\n\n  b\t c {filler}</p></article>"));
        let extracted = extract_from_html(&html, 10).unwrap();
        assert!(extracted.text.starts_with("a b c"));
    }
}
