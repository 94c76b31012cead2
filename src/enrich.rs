// src/enrich.rs
// Bounded enrichment pool. Workers share a monotonically increasing index
// cursor (work stealing by index, not by partition) and write into
// pre-sized per-index slots, so output order always matches input order.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use metrics::{counter, describe_counter};
use once_cell::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::extract::ArticleExtractor;
use crate::ingest::types::{NormalizedArticle, RssSource};

pub const DEFAULT_CONCURRENCY: usize = 4;

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("enrich_extracted_total", "Articles enriched with page text.");
        describe_counter!("enrich_fallback_total", "Articles falling back to feed summary.");
        describe_counter!("enrich_skipped_total", "Articles skipped (content present or extraction unsupported).");
    });
}

/// Fill in missing article bodies with a fixed-size worker pool. Individual
/// extraction failures degrade to the feed summary and never fail the run.
pub async fn enrich_articles(
    articles: Vec<NormalizedArticle>,
    sources: &HashMap<&str, &RssSource>,
    extractor: &dyn ArticleExtractor,
    concurrency: usize,
) -> Vec<NormalizedArticle> {
    ensure_metrics_described();
    let total = articles.len();
    if total == 0 {
        return Vec::new();
    }

    let workers = concurrency.max(1).min(total);
    let cursor = AtomicUsize::new(0);
    let input = &articles;
    let cursor_ref = &cursor;

    let worker_tasks = (0..workers).map(|_| async move {
        let mut produced: Vec<(usize, NormalizedArticle)> = Vec::new();
        loop {
            let index = cursor_ref.fetch_add(1, Ordering::Relaxed);
            if index >= total {
                break;
            }
            let article = input[index].clone();
            let enriched = enrich_one(article, index, total, sources, extractor).await;
            produced.push((index, enriched));
        }
        produced
    });

    let mut slots: Vec<Option<NormalizedArticle>> = (0..total).map(|_| None).collect();
    for batch in futures::future::join_all(worker_tasks).await {
        for (index, article) in batch {
            slots[index] = Some(article);
        }
    }

    info!(total, workers, "enrichment pool drained");
    // Every slot was claimed exactly once by construction.
    slots.into_iter().flatten().collect()
}

async fn enrich_one(
    mut article: NormalizedArticle,
    index: usize,
    total: usize,
    sources: &HashMap<&str, &RssSource>,
    extractor: &dyn ArticleExtractor,
) -> NormalizedArticle {
    let label_title = trim_title(&article.title);

    if article.content.is_some() {
        debug!(
            position = index + 1,
            total,
            source = %article.source,
            title = %label_title,
            "already has content, skipping"
        );
        counter!("enrich_skipped_total").increment(1);
        return article;
    }

    let source = sources.get(article.source.as_str());
    let supports_extraction = source.map(|s| s.supports_extraction).unwrap_or(false);
    if !supports_extraction {
        counter!("enrich_skipped_total").increment(1);
        if !article.summary.is_empty() {
            article.content = Some(article.summary.clone());
        }
        return article;
    }

    let headers = source.and_then(|s| s.headers);
    debug!(
        position = index + 1,
        total,
        source = %article.source,
        title = %label_title,
        "fetching article body"
    );
    match extractor.extract(&article.link, headers).await {
        Some(extracted) => {
            counter!("enrich_extracted_total").increment(1);
            article.content = Some(extracted.text);
        }
        None => {
            counter!("enrich_fallback_total").increment(1);
            warn!(
                position = index + 1,
                total,
                source = %article.source,
                title = %label_title,
                "extraction failed, falling back to summary"
            );
            if !article.summary.is_empty() {
                article.content = Some(article.summary.clone());
            }
        }
    }
    article
}

fn trim_title(title: &str) -> String {
    const MAX: usize = 72;
    if title.chars().count() <= MAX {
        return title.to_string();
    }
    let cut: String = title.chars().take(MAX).collect();
    format!("{cut}…")
}
