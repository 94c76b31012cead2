// src/ingest/rss.rs
// Feed transport and XML parsing. The fetcher is a trait so tests (and the
// pipeline harness) can feed canned XML without touching the network.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use quick_xml::de::from_str;
use serde::Deserialize;

use crate::ingest::types::RssItem;

const FEED_TIMEOUT: Duration = Duration::from_secs(20);
const FEED_USER_AGENT: &str = "world-brief/0.1 (+https://github.com)";

#[async_trait]
pub trait FeedFetcher: Send + Sync {
    /// Fetch the raw feed document for `url`.
    async fn fetch(&self, url: &str) -> Result<String>;
}

pub struct HttpFeedFetcher {
    client: reqwest::Client,
}

impl HttpFeedFetcher {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(FEED_USER_AGENT)
            .timeout(FEED_TIMEOUT)
            .build()
            .context("building feed http client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl FeedFetcher for HttpFeedFetcher {
    async fn fetch(&self, url: &str) -> Result<String> {
        let response = self
            .client
            .get(url)
            .header(
                reqwest::header::ACCEPT,
                "application/rss+xml, application/xml, text/xml;q=0.9,*/*;q=0.8",
            )
            .send()
            .await
            .with_context(|| format!("fetching feed {url}"))?;

        let status = response.status();
        if !status.is_success() {
            bail!("feed fetch failed: {url} {status}");
        }

        response.text().await.context("reading feed body")
    }
}

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Option<Channel>,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<RssItem>,
}

/// Parse a feed document into its items. A document without a channel
/// yields an empty list; malformed XML is an error the caller isolates
/// per source.
pub fn parse_items(xml: &str) -> Result<Vec<RssItem>> {
    let cleaned = scrub_html_entities_for_xml(xml);
    let rss: Rss = from_str(&cleaned).context("parsing rss xml")?;
    Ok(rss.channel.map(|channel| channel.item).unwrap_or_default())
}

// Publisher feeds leak HTML entities the XML parser refuses; swap the
// common offenders for plain characters before deserializing.
fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_items_with_prefixed_tags_and_attributes() {
        let xml = r#"<?xml version="1.0"?>
<rss version="2.0" xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:media="http://search.yahoo.com/mrss/">
  <channel>
    <title>Example</title>
    <item>
      <title>First story</title>
      <link>https://example.test/a</link>
      <description>Short &amp; sweet</description>
      <pubDate>Tue, 02 Sep 2025 10:00:00 GMT</pubDate>
      <dc:date>2025-09-02T10:00:00Z</dc:date>
      <guid isPermaLink="false">guid-1</guid>
      <dc:creator>Jane Doe</dc:creator>
      <category domain="news">World</category>
      <category>Politics</category>
      <media:thumbnail url="https://example.test/a.jpg" width="200"/>
      <media:content url="https://example.test/a-wide.jpg" width="460"/>
    </item>
  </channel>
</rss>"#;

        let items = parse_items(xml).unwrap();
        assert_eq!(items.len(), 1);
        let item = &items[0];
        assert_eq!(item.title.as_deref(), Some("First story"));
        assert_eq!(item.link.as_deref(), Some("https://example.test/a"));
        assert_eq!(item.guid.as_ref().unwrap().text(), "guid-1");
        // Namespaced elements arrive under their local names.
        assert_eq!(item.creators, vec!["Jane Doe".to_string()]);
        assert_eq!(item.dc_date.as_deref(), Some("2025-09-02T10:00:00Z"));
        assert_eq!(item.categories.len(), 2);
        assert_eq!(item.categories[0].text(), "World");
        assert_eq!(
            item.media_thumbnail.as_ref().unwrap().url.as_deref(),
            Some("https://example.test/a.jpg")
        );
        assert_eq!(item.media_content.len(), 1);
        assert_eq!(
            item.media_content[0].url.as_deref(),
            Some("https://example.test/a-wide.jpg")
        );
    }

    #[test]
    fn missing_channel_yields_empty_list() {
        let items = parse_items(r#"<?xml version="1.0"?><rss version="2.0"></rss>"#).unwrap();
        assert!(items.is_empty());
    }

    #[test]
    fn malformed_xml_is_an_error() {
        assert!(parse_items("not xml at all <<<").is_err());
    }

    #[test]
    fn stray_html_entities_are_scrubbed_before_parsing() {
        let xml = r#"<rss><channel><item><title>A&nbsp;&mdash;&nbsp;B</title><link>x</link></item></channel></rss>"#;
        let items = parse_items(xml).unwrap();
        assert_eq!(items[0].title.as_deref(), Some("A - B"));
    }
}
