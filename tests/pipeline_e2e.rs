// Full pipeline runs against canned feeds, a canned extractor, and a
// scripted chat model: window + dedup feeding the LLM phases, invented
// refs dropped, a summary-less event dropped, and the guard released on
// every path out.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use world_brief::config::PipelineConfig;
use world_brief::extract::{ArticleExtractor, Extracted};
use world_brief::ingest::rss::FeedFetcher;
use world_brief::ingest::sources;
use world_brief::llm::{ChatClient, LlmError};
use world_brief::pipeline::{run, PipelineDeps, RunOutcome};
use world_brief::store::{RunGuard, SqlRunGuard, Store};

const LINK_STORM: &str = "https://example.test/storm";
const LINK_QUIET: &str = "https://example.test/quiet";
const LINK_STALE: &str = "https://example.test/stale";

fn feed_item(title: &str, link: &str, summary: &str, published: DateTime<Utc>) -> String {
    format!(
        "<item><title>{title}</title><link>{link}</link>\
         <description>{summary}</description>\
         <pubDate>{}</pubDate></item>",
        published.to_rfc2822()
    )
}

fn feed(items: &[String]) -> String {
    format!(
        "<?xml version=\"1.0\"?><rss version=\"2.0\"><channel>{}</channel></rss>",
        items.concat()
    )
}

struct CannedFeeds {
    by_url: HashMap<String, String>,
}

#[async_trait]
impl FeedFetcher for CannedFeeds {
    async fn fetch(&self, url: &str) -> Result<String> {
        match self.by_url.get(url) {
            Some(xml) => Ok(xml.clone()),
            None => bail!("no canned feed for {url}"),
        }
    }
}

struct CannedExtractor;

#[async_trait]
impl ArticleExtractor for CannedExtractor {
    async fn extract(&self, url: &str, _headers: Option<&[(&str, &str)]>) -> Option<Extracted> {
        Some(Extracted {
            text: format!("extracted body of {url}"),
            title: None,
        })
    }
}

/// Plays a fixed clustering answer, then summaries keyed off the prompt:
/// the quiet article only ever gets whitespace back.
struct ScriptedChat {
    clustering: String,
    calls: AtomicUsize,
}

#[async_trait]
impl ChatClient for ScriptedChat {
    async fn complete(&self, _system: Option<&str>, user: &str) -> Result<String, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if user.contains("group them into events") {
            return Ok(self.clustering.clone());
        }
        if user.contains(LINK_QUIET) {
            return Ok("   \n".to_string());
        }
        Ok("A storm made landfall on the northern coast overnight.".to_string())
    }
}

fn canned_feeds(now: DateTime<Utc>) -> CannedFeeds {
    // The storm story appears twice in the BBC feed (link dedup), the
    // stale NYT story sits outside the 8-hour window.
    let bbc = feed(&[
        feed_item("Storm hits coast", LINK_STORM, "Storm summary", now - Duration::hours(1)),
        feed_item("Storm hits coast (repost)", LINK_STORM, "Storm summary", now - Duration::hours(2)),
    ]);
    let nyt = feed(&[
        feed_item("A quiet day", LINK_QUIET, "Quiet summary", now - Duration::hours(2)),
        feed_item("Old news", LINK_STALE, "Stale summary", now - Duration::hours(20)),
    ]);
    CannedFeeds {
        by_url: HashMap::from([
            (sources::BBC.url.to_string(), bbc),
            (sources::NYT.url.to_string(), nyt),
        ]),
    }
}

async fn test_store() -> Store {
    let store = Store::connect_in_memory().await.unwrap();
    store.migrate().await.unwrap();
    store
}

fn deps(store: &Store, chat: Arc<dyn ChatClient>) -> PipelineDeps {
    PipelineDeps {
        guard: Arc::new(SqlRunGuard::new(store)),
        store: store.clone(),
        feeds: Arc::new(canned_feeds(Utc::now())),
        extractor: Arc::new(CannedExtractor),
        chat,
        sources: vec![sources::BBC, sources::NYT],
    }
}

#[tokio::test]
async fn a_full_run_persists_summarized_events_and_drops_the_rest() {
    let store = test_store().await;
    let chat = Arc::new(ScriptedChat {
        // A999 was never handed out; the quiet event will never summarize.
        clustering: concat!(
            "Sure, here are the events:\n",
            r#"{"events":[
                {"event_key":"storm","title":"Coastal storm","article_refs":["A001","A999"]},
                {"event_key":"quiet","title":"Quiet day","article_refs":["A002"]}
            ]}"#
        )
        .to_string(),
        calls: AtomicUsize::new(0),
    });
    let deps = deps(&store, chat.clone());
    let cfg = PipelineConfig::default();

    let outcome = run(&deps, &cfg).await.unwrap();
    let RunOutcome::Completed {
        run_id,
        events_written,
    } = outcome
    else {
        panic!("run was skipped");
    };
    assert_eq!(events_written, 1);

    // One clustering call, one storm summary, two attempts on the quiet
    // event before it is dropped.
    assert_eq!(chat.calls.load(Ordering::SeqCst), 4);

    // Only the two in-window articles were persisted; the BBC one carries
    // extracted text, the NYT one falls back to its feed summary.
    let detail = store.run_detail(&run_id).await.unwrap().unwrap();
    assert_eq!(detail.events.len(), 1);
    let event = &detail.events[0];
    assert_eq!(event.title, "Coastal storm");
    assert_eq!(
        event.summary,
        "A storm made landfall on the northern coast overnight."
    );
    assert_eq!(event.references.len(), 1);
    assert_eq!(event.references[0].link, LINK_STORM);
    assert_eq!(
        event.references[0].content.as_deref(),
        Some(format!("extracted body of {LINK_STORM}").as_str())
    );

    // The run lock is free again.
    let guard = SqlRunGuard::new(&store);
    assert!(guard.held_since().await.unwrap().is_none());
}

#[tokio::test]
async fn a_recent_lock_holder_turns_the_run_into_a_skip() {
    let store = test_store().await;
    let guard = SqlRunGuard::new(&store);
    assert!(guard
        .try_acquire(Utc::now() - Duration::minutes(5), cfg_stale())
        .await
        .unwrap());

    let chat = Arc::new(ScriptedChat {
        clustering: r#"{"events":[]}"#.to_string(),
        calls: AtomicUsize::new(0),
    });
    let deps = deps(&store, chat.clone());

    let outcome = run(&deps, &PipelineConfig::default()).await.unwrap();
    assert_eq!(outcome, RunOutcome::Skipped);
    assert_eq!(chat.calls.load(Ordering::SeqCst), 0);
    assert_eq!(store.count_runs().await.unwrap(), 0);
    // The skipped invocation never touches the holder's lock.
    assert!(guard.held_since().await.unwrap().is_some());
}

fn cfg_stale() -> std::time::Duration {
    PipelineConfig::default().stale_lock_after
}

/// A model that only ever returns prose: clustering can never parse.
struct BabblingChat;

#[async_trait]
impl ChatClient for BabblingChat {
    async fn complete(&self, _system: Option<&str>, _user: &str) -> Result<String, LlmError> {
        Ok("I could not find any JSON to give you.".to_string())
    }
}

#[tokio::test]
async fn persistent_clustering_garbage_fails_the_run_but_frees_the_lock() {
    let store = test_store().await;
    let deps = deps(&store, Arc::new(BabblingChat));

    let result = run(&deps, &PipelineConfig::default()).await;
    assert!(result.is_err());
    assert_eq!(store.count_runs().await.unwrap(), 0);

    let guard = SqlRunGuard::new(&store);
    assert!(guard.held_since().await.unwrap().is_none());
}

#[tokio::test]
async fn an_empty_window_still_records_the_run() {
    let store = test_store().await;
    let chat = Arc::new(ScriptedChat {
        clustering: r#"{"events":[]}"#.to_string(),
        calls: AtomicUsize::new(0),
    });

    // Every feed item is far older than the window.
    let old = Utc::now() - Duration::days(3);
    let mut deps = deps(&store, chat.clone());
    deps.feeds = Arc::new(canned_feeds(old));

    let outcome = run(&deps, &PipelineConfig::default()).await.unwrap();
    assert!(matches!(
        outcome,
        RunOutcome::Completed {
            events_written: 0,
            ..
        }
    ));
    // No articles means no LLM traffic at all.
    assert_eq!(chat.calls.load(Ordering::SeqCst), 0);
    assert_eq!(store.count_runs().await.unwrap(), 1);
}
