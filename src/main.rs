//! world-brief — Pipeline Binary Entrypoint
//! Executes exactly one pipeline run per invocation; scheduling is
//! external (cron or a systemd timer). Exits non-zero on a fatal run
//! failure so the scheduler can alert.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{error, info};

use world_brief::config::{LlmSettings, PipelineConfig};
use world_brief::extract::HttpArticleExtractor;
use world_brief::ingest::rss::HttpFeedFetcher;
use world_brief::ingest::sources;
use world_brief::llm::OpenAiChatClient;
use world_brief::pipeline::{self, PipelineDeps, RunOutcome};
use world_brief::store::{SqlRunGuard, Store};

#[tokio::main]
async fn main() {
    // Load .env in local/dev; no-op in production environments.
    let _ = dotenvy::dotenv();
    world_brief::init_tracing();

    if let Err(err) = run().await {
        error!(error = ?err, "pipeline run failed");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cfg = PipelineConfig::from_env();
    let llm_settings = LlmSettings::from_env().context("loading llm endpoint settings")?;

    let database_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://world_brief.db".to_string());
    let store = Store::connect(&database_url).await?;
    store.migrate().await?;

    let deps = PipelineDeps {
        guard: Arc::new(SqlRunGuard::new(&store)),
        store: store.clone(),
        feeds: Arc::new(HttpFeedFetcher::new()?),
        extractor: Arc::new(HttpArticleExtractor::new(
            cfg.extract_timeout,
            cfg.extract_min_text_chars,
        )?),
        chat: Arc::new(OpenAiChatClient::new(llm_settings)?),
        sources: sources::all(),
    };

    match pipeline::run(&deps, &cfg).await? {
        RunOutcome::Skipped => {
            info!("run skipped: another run is in progress");
        }
        RunOutcome::Completed {
            run_id,
            events_written,
        } => {
            info!(run_id = %run_id, events = events_written, "run completed");
        }
    }

    Ok(())
}
