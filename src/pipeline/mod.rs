// src/pipeline/mod.rs
// The run orchestrator: guard admission, ingest, window+dedup, enrichment,
// the two LLM phases, and the atomic run write. Stage failures release the
// guard before propagating.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{anyhow, bail, Context, Result};
use chrono::Utc;
use metrics::{counter, describe_counter};
use once_cell::sync::OnceCell;
use serde::Deserialize;
use tracing::{error, info, warn};

use crate::config::PipelineConfig;
use crate::enrich::enrich_articles;
use crate::extract::ArticleExtractor;
use crate::ingest::rss::FeedFetcher;
use crate::ingest::types::{NormalizedArticle, RssSource};
use crate::ingest::{dedupe_by_link, filter_by_window, ingest_sources, RunWindow};
use crate::llm::prompts::{
    build_summary_system_prompt, EVENTS_SYSTEM_PROMPT, EVENTS_USER_PROMPT, SUMMARY_USER_PROMPT,
};
use crate::llm::ChatClient;
use crate::store::{EventReference, NewEvent, RunGuard, Store};

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("pipeline_runs_total", "Completed pipeline runs.");
        describe_counter!("pipeline_runs_skipped_total", "Runs skipped on lock contention.");
        describe_counter!("pipeline_events_written_total", "Events persisted across runs.");
        describe_counter!("pipeline_events_failed_total", "Events dropped after summary retries.");
    });
}

/// Everything a run touches, behind seams so the whole pipeline is
/// drivable from tests without a network or a real LLM.
pub struct PipelineDeps {
    pub guard: Arc<dyn RunGuard>,
    pub store: Store,
    pub feeds: Arc<dyn FeedFetcher>,
    pub extractor: Arc<dyn ArticleExtractor>,
    pub chat: Arc<dyn ChatClient>,
    pub sources: Vec<RssSource>,
}

#[derive(Debug, PartialEq, Eq)]
pub enum RunOutcome {
    /// Another run holds the lock; not an error.
    Skipped,
    Completed {
        run_id: String,
        events_written: usize,
    },
}

/// One end-to-end pipeline run. The guard is released on every path out,
/// including failures, so a crashed run never blocks the next schedule
/// beyond the staleness threshold.
pub async fn run(deps: &PipelineDeps, cfg: &PipelineConfig) -> Result<RunOutcome> {
    ensure_metrics_described();
    let now = Utc::now();

    if !deps
        .guard
        .try_acquire(now, cfg.stale_lock_after)
        .await
        .context("run lock acquisition")?
    {
        counter!("pipeline_runs_skipped_total").increment(1);
        info!("skipping run: lock held by a recent run");
        return Ok(RunOutcome::Skipped);
    }

    let outcome = run_locked(deps, cfg).await;

    if let Err(release_err) = deps.guard.release().await {
        error!(error = %release_err, "failed to release run lock");
    }

    outcome
}

async fn run_locked(deps: &PipelineDeps, cfg: &PipelineConfig) -> Result<RunOutcome> {
    // Ingest → window → dedup.
    info!("starting ingest");
    let ingested = ingest_sources(deps.feeds.as_ref(), &deps.sources).await;
    let total = ingested.len();

    let window = RunWindow::trailing(Utc::now(), cfg.window_minutes);
    let windowed = filter_by_window(ingested, &window);
    let filtered = windowed.len();
    let articles = dedupe_by_link(windowed);
    info!(
        total,
        window_minutes = cfg.window_minutes,
        filtered,
        unique = articles.len(),
        "ingest done"
    );

    // Enrichment must fully drain before any LLM call.
    let source_lookup: HashMap<&str, &RssSource> =
        deps.sources.iter().map(|source| (source.id, source)).collect();
    let enriched = enrich_articles(
        articles,
        &source_lookup,
        deps.extractor.as_ref(),
        cfg.enrich_concurrency,
    )
    .await;

    // Articles are shared across runs; their upsert is idempotent and
    // deliberately outside the run transaction.
    let stored = deps.store.upsert_articles(&enriched).await?;
    let stored_by_link: HashMap<&str, &str> = stored
        .iter()
        .map(|article| (article.link.as_str(), article.id.as_str()))
        .collect();

    if enriched.is_empty() {
        let run_id = deps.store.create_run_with_events(&window, &[]).await?;
        counter!("pipeline_runs_total").increment(1);
        info!(run_id = %run_id, "no articles in window; wrote empty run");
        return Ok(RunOutcome::Completed {
            run_id,
            events_written: 0,
        });
    }

    // Run-local reference tokens, derived from position only.
    let with_refs: Vec<(String, &NormalizedArticle)> = enriched
        .iter()
        .enumerate()
        .map(|(index, article)| (ref_token(index), article))
        .collect();

    info!(articles = with_refs.len(), "building event grouping input");
    let groups = cluster_articles(deps.chat.as_ref(), &with_refs, cfg.parse_retries).await?;

    let summary_system_prompt = build_summary_system_prompt(cfg.local_language.as_deref());
    let mut new_events: Vec<NewEvent> = Vec::with_capacity(groups.len());
    for (index, group) in groups.iter().enumerate() {
        // Refs the model invented are dropped silently.
        let event_articles: Vec<&(String, &NormalizedArticle)> = with_refs
            .iter()
            .filter(|(token, _)| group.article_refs.iter().any(|r| r == token))
            .collect();
        if event_articles.is_empty() {
            warn!(event_key = %group.event_key, "no resolvable refs, skipping event");
            continue;
        }

        info!(
            position = index + 1,
            total = groups.len(),
            event_key = %group.event_key,
            refs = event_articles.len(),
            "summarizing event"
        );
        let started = Instant::now();
        let summary = summarize_event(
            deps.chat.as_ref(),
            &summary_system_prompt,
            &event_articles,
            cfg.summary_context_chars,
            cfg.parse_retries,
        )
        .await;
        let Some(summary) = summary else {
            counter!("pipeline_events_failed_total").increment(1);
            error!(
                event_key = %group.event_key,
                title = %group.title,
                "event summarization exhausted retries, dropping event"
            );
            continue;
        };
        info!(
            event_key = %group.event_key,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "summary done"
        );

        let references: Vec<EventReference> = event_articles
            .iter()
            .map(|(_, article)| EventReference {
                source: article.source.clone(),
                title: article.title.clone(),
                link: article.link.clone(),
                published_at: article.published_at,
            })
            .collect();
        let article_ids: Vec<String> = event_articles
            .iter()
            .filter_map(|(_, article)| stored_by_link.get(article.link.as_str()))
            .map(|id| id.to_string())
            .collect();

        new_events.push(NewEvent {
            title: group.title.clone(),
            summary,
            references,
            article_ids,
        });
    }

    // Exactly one atomic unit of work for the run and its events.
    let run_id = deps
        .store
        .create_run_with_events(&window, &new_events)
        .await
        .context("persisting run")?;

    counter!("pipeline_runs_total").increment(1);
    counter!("pipeline_events_written_total").increment(new_events.len() as u64);
    info!(run_id = %run_id, events = new_events.len(), "wrote events to database");

    Ok(RunOutcome::Completed {
        run_id,
        events_written: new_events.len(),
    })
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct EventGroup {
    pub event_key: String,
    pub title: String,
    pub article_refs: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct EventsResponse {
    events: Vec<EventGroup>,
}

/// Clustering phase: one prompt over all articles, shape-checked JSON out.
/// Transport-level failures are fatal here (the client already retried);
/// malformed output gets `parse_retries` extra full calls before the run
/// fails at this stage.
async fn cluster_articles(
    chat: &dyn ChatClient,
    with_refs: &[(String, &NormalizedArticle)],
    parse_retries: u32,
) -> Result<Vec<EventGroup>> {
    let event_input = with_refs
        .iter()
        .map(|(token, article)| {
            format!(
                "[{token}] {}\n{}\n{}",
                article.title,
                grouping_context(article),
                article.link
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n");
    let user = format!("{EVENTS_USER_PROMPT}\n\nArticles:\n{event_input}");

    let attempts = parse_retries + 1;
    let mut last_parse_error = None;
    for attempt in 1..=attempts {
        let started = Instant::now();
        let raw = chat
            .complete(Some(EVENTS_SYSTEM_PROMPT), &user)
            .await
            .context("event grouping request")?;
        match parse_events(&raw) {
            Ok(groups) => {
                info!(
                    events = groups.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "event grouping done"
                );
                return Ok(groups);
            }
            Err(err) => {
                warn!(attempt, attempts, error = %err, "malformed event grouping response");
                last_parse_error = Some(err);
            }
        }
    }

    Err(last_parse_error
        .unwrap_or_else(|| anyhow!("event grouping produced no attempts"))
        .context("event grouping response stayed malformed after retries"))
}

/// Summarization phase for one event. Failures here are per-event: an
/// error or empty response consumes an attempt, and exhausting the budget
/// yields `None` so the caller drops the event and moves on.
async fn summarize_event(
    chat: &dyn ChatClient,
    system_prompt: &str,
    event_articles: &[&(String, &NormalizedArticle)],
    context_chars: usize,
    parse_retries: u32,
) -> Option<String> {
    let summary_input = event_articles
        .iter()
        .map(|(_, article)| {
            format!(
                "Title: {}\nSummary: {}\nLink: {}",
                article.title,
                summary_context(article, context_chars),
                article.link
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n");
    let user = format!("{SUMMARY_USER_PROMPT}\n\n{summary_input}");

    let attempts = parse_retries + 1;
    for attempt in 1..=attempts {
        match chat.complete(Some(system_prompt), &user).await {
            Ok(text) => {
                let trimmed = text.trim();
                if !trimmed.is_empty() {
                    return Some(trimmed.to_string());
                }
                warn!(attempt, attempts, "empty summary response");
            }
            Err(err) => {
                warn!(attempt, attempts, error = %err, "summary request failed");
            }
        }
    }
    None
}

/// Short run-local token for prompt addressing: `A` plus the 1-based
/// position in zero-padded base 36 (`A001`, `A00A`, `A010`, …).
pub fn ref_token(index: usize) -> String {
    format!("A{:0>3}", base36_upper(index as u64 + 1))
}

fn base36_upper(mut n: u64) -> String {
    const DIGITS: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";
    if n == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8(out).expect("base36 digits are ascii")
}

fn grouping_context(article: &NormalizedArticle) -> &str {
    if article.summary.is_empty() {
        &article.title
    } else {
        &article.summary
    }
}

/// Content → summary → title, truncated to the character budget with an
/// ellipsis marker.
fn summary_context(article: &NormalizedArticle, max_chars: usize) -> String {
    let value = article
        .content
        .as_deref()
        .filter(|c| !c.is_empty())
        .unwrap_or_else(|| {
            if article.summary.is_empty() {
                &article.title
            } else {
                &article.summary
            }
        });
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    let cut: String = value.chars().take(max_chars).collect();
    format!("{cut}…")
}

/// Parse the clustering response: slice the outermost JSON object, parse
/// provisionally, and validate the expected shape explicitly. Shape
/// violations are errors of the "malformed output" kind, never panics.
pub fn parse_events(raw: &str) -> Result<Vec<EventGroup>> {
    let trimmed = raw.trim();
    let json_text = match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if start < end => &trimmed[start..=end],
        _ => trimmed,
    };

    let value: serde_json::Value =
        serde_json::from_str(json_text).context("clustering response is not valid JSON")?;
    let events = value
        .get("events")
        .ok_or_else(|| anyhow!("clustering response has no `events` field"))?;
    if !events.is_array() {
        bail!("clustering response `events` is not an array");
    }

    let parsed: Vec<EventGroup> = serde_json::from_value(events.clone())
        .context("clustering response events have an unexpected shape")?;
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn article(summary: &str, content: Option<&str>) -> NormalizedArticle {
        NormalizedArticle {
            source: "bbc".to_string(),
            title: "Title".to_string(),
            link: "https://example.test/a".to_string(),
            summary: summary.to_string(),
            content: content.map(str::to_string),
            published_at: None,
            guid: None,
            authors: Vec::new(),
            categories: Vec::new(),
            image_url: None,
        }
    }

    #[test]
    fn ref_tokens_are_short_padded_base36() {
        assert_eq!(ref_token(0), "A001");
        assert_eq!(ref_token(8), "A009");
        assert_eq!(ref_token(9), "A00A");
        assert_eq!(ref_token(35), "A010");
        assert_eq!(ref_token(1294), "A0ZZ");
    }

    #[test]
    fn parse_events_accepts_prose_wrapped_json() {
        let raw = "Here you go:\n{\"events\":[{\"event_key\":\"e1\",\"title\":\"T\",\"article_refs\":[\"A001\"]}]}\nThanks!";
        let events = parse_events(raw).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_key, "e1");
        assert_eq!(events[0].article_refs, vec!["A001".to_string()]);
    }

    #[test]
    fn parse_events_rejects_bad_shapes() {
        assert!(parse_events("not json").is_err());
        assert!(parse_events("{\"something\":[]}").is_err());
        assert!(parse_events("{\"events\":{}}").is_err());
        assert!(parse_events("{\"events\":[{\"event_key\":1}]}").is_err());
    }

    #[test]
    fn parse_events_accepts_empty_event_list() {
        assert!(parse_events("{\"events\":[]}").unwrap().is_empty());
    }

    #[test]
    fn grouping_context_falls_back_to_title() {
        let with_summary = article("short summary", None);
        assert_eq!(grouping_context(&with_summary), "short summary");
        let without = article("", None);
        assert_eq!(grouping_context(&without), "Title");
    }

    #[test]
    fn summary_context_prefers_content_and_truncates() {
        let long_content = "c".repeat(50);
        let a = article("summary", Some(&long_content));
        let snippet = summary_context(&a, 10);
        assert_eq!(snippet, format!("{}…", "c".repeat(10)));

        let no_content = article("summary", None);
        assert_eq!(summary_context(&no_content, 100), "summary");

        let bare = article("", None);
        assert_eq!(summary_context(&bare, 100), "Title");
    }
}
