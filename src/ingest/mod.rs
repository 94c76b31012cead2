// src/ingest/mod.rs
pub mod normalize;
pub mod rss;
pub mod sources;
pub mod types;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use metrics::{counter, describe_counter, describe_histogram, histogram};
use once_cell::sync::OnceCell;
use std::collections::HashSet;
use std::time::Instant;
use tracing::{error, info};

use crate::ingest::rss::{parse_items, FeedFetcher};
use crate::ingest::types::{NormalizedArticle, RssSource};

/// One-time metrics registration (so series show up on /metrics).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("ingest_articles_total", "Articles mapped from feeds.");
        describe_counter!("ingest_source_errors_total", "Feed fetch/parse errors.");
        describe_counter!("ingest_dedup_total", "Articles removed as duplicate links.");
        describe_counter!("ingest_window_dropped_total", "Articles outside the run window.");
        describe_histogram!("ingest_fetch_ms", "Per-source fetch+parse time in milliseconds.");
    });
}

/// Fetch and map every source concurrently. A single source failing to
/// fetch or parse contributes an empty list and never aborts its siblings.
/// Output order is source order, then item order within each source.
pub async fn ingest_sources(
    fetcher: &dyn FeedFetcher,
    sources: &[RssSource],
) -> Vec<NormalizedArticle> {
    ensure_metrics_described();

    let tasks = sources.iter().map(|source| async move {
        let started = Instant::now();
        let result: anyhow::Result<Vec<NormalizedArticle>> = async {
            info!(source = source.id, url = source.url, "fetching feed");
            let xml = fetcher.fetch(source.url).await?;
            let items = parse_items(&xml)?;
            let mapped: Vec<NormalizedArticle> =
                items.iter().filter_map(|item| (source.map_item)(item)).collect();
            info!(
                source = source.id,
                items = items.len(),
                mapped = mapped.len(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "feed ingested"
            );
            Ok(mapped)
        }
        .await;

        histogram!("ingest_fetch_ms").record(started.elapsed().as_secs_f64() * 1_000.0);
        match result {
            Ok(mapped) => {
                counter!("ingest_articles_total").increment(mapped.len() as u64);
                mapped
            }
            Err(err) => {
                counter!("ingest_source_errors_total").increment(1);
                error!(
                    source = source.id,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    error = %err,
                    "feed ingest failed"
                );
                Vec::new()
            }
        }
    });

    futures::future::join_all(tasks)
        .await
        .into_iter()
        .flatten()
        .collect()
}

/// Keep the first occurrence of each canonical link, in input order.
pub fn dedupe_by_link(articles: Vec<NormalizedArticle>) -> Vec<NormalizedArticle> {
    let mut seen: HashSet<String> = HashSet::with_capacity(articles.len());
    let mut output = Vec::with_capacity(articles.len());
    let mut dropped = 0u64;
    for article in articles {
        if seen.insert(article.link.clone()) {
            output.push(article);
        } else {
            dropped += 1;
        }
    }
    if dropped > 0 {
        counter!("ingest_dedup_total").increment(dropped);
    }
    output
}

/// The trailing time window of one run, computed once at run start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl RunWindow {
    pub fn trailing(now: DateTime<Utc>, minutes: i64) -> Self {
        Self {
            start: now - ChronoDuration::minutes(minutes.max(1)),
            end: now,
        }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.start && at <= self.end
    }
}

/// Retain only articles whose publish timestamp is known and inside the
/// window. Undated articles cannot be time-windowed and are always dropped.
pub fn filter_by_window(
    articles: Vec<NormalizedArticle>,
    window: &RunWindow,
) -> Vec<NormalizedArticle> {
    let before = articles.len();
    let kept: Vec<NormalizedArticle> = articles
        .into_iter()
        .filter(|article| {
            article
                .published_at
                .map(|at| window.contains(at))
                .unwrap_or(false)
        })
        .collect();
    let dropped = (before - kept.len()) as u64;
    if dropped > 0 {
        counter!("ingest_window_dropped_total").increment(dropped);
    }
    kept
}
