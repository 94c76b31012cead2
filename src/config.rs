// src/config.rs
// Environment-driven configuration for the pipeline binary.
// All knobs have defaults; only the primary LLM endpoint triple is required.

use std::time::Duration;

use anyhow::{anyhow, Result};

/// Tunables for one pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Trailing window in minutes; articles published outside it are dropped.
    pub window_minutes: i64,
    /// Worker count for the content enrichment pool.
    pub enrich_concurrency: usize,
    /// Extra attempts when the LLM returns malformed clustering JSON or an
    /// empty summary. Applies per call site, on top of the client's own
    /// transport-level retries.
    pub parse_retries: u32,
    /// Age after which a run lock is presumed abandoned and may be stolen.
    pub stale_lock_after: Duration,
    /// Character budget for each article's summarization snippet.
    pub summary_context_chars: usize,
    /// When set, summaries are requested bilingually (English first).
    pub local_language: Option<String>,
    /// Page-fetch timeout for article extraction.
    pub extract_timeout: Duration,
    /// Minimum extracted text length to count as a usable article body.
    pub extract_min_text_chars: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            window_minutes: 480,
            enrich_concurrency: 4,
            parse_retries: 1,
            stale_lock_after: Duration::from_secs(10 * 60),
            summary_context_chars: 4000,
            local_language: None,
            extract_timeout: Duration::from_secs(15),
            extract_min_text_chars: 200,
        }
    }
}

impl PipelineConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            window_minutes: parse_window_minutes(env_opt("WINDOW_MINUTES").as_deref()),
            enrich_concurrency: env_opt("CONTENT_FETCH_CONCURRENCY")
                .and_then(|v| v.parse::<usize>().ok())
                .map(|v| v.max(1))
                .unwrap_or(defaults.enrich_concurrency),
            parse_retries: env_opt("LLM_PARSE_RETRIES")
                .and_then(|v| v.parse::<u32>().ok())
                .unwrap_or(defaults.parse_retries),
            stale_lock_after: env_opt("RUN_LOCK_STALE_MINUTES")
                .and_then(|v| v.parse::<u64>().ok())
                .filter(|v| *v > 0)
                .map(|v| Duration::from_secs(v * 60))
                .unwrap_or(defaults.stale_lock_after),
            summary_context_chars: env_opt("SUMMARY_CONTEXT_CHARS")
                .and_then(|v| v.parse::<usize>().ok())
                .filter(|v| *v > 0)
                .unwrap_or(defaults.summary_context_chars),
            local_language: env_opt("LOCAL_LANGUAGE"),
            extract_timeout: env_opt("EXTRACT_TIMEOUT_SECS")
                .and_then(|v| v.parse::<u64>().ok())
                .filter(|v| *v > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.extract_timeout),
            extract_min_text_chars: env_opt("EXTRACT_MIN_TEXT_CHARS")
                .and_then(|v| v.parse::<usize>().ok())
                .unwrap_or(defaults.extract_min_text_chars),
        }
    }
}

/// Window parsing mirrors the lenient numeric handling the scheduler relies
/// on: anything non-finite or non-positive falls back to 480 minutes.
pub fn parse_window_minutes(value: Option<&str>) -> i64 {
    let parsed = value.unwrap_or("480").trim().parse::<f64>().unwrap_or(f64::NAN);
    if !parsed.is_finite() || parsed <= 0.0 {
        return 480;
    }
    (parsed.floor() as i64).max(1)
}

/// One chat-completion endpoint: base URL, key, model.
#[derive(Debug, Clone)]
pub struct LlmEndpoint {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
}

/// Primary endpoint plus optional backup, and the per-endpoint retry budget.
#[derive(Debug, Clone)]
pub struct LlmSettings {
    pub primary: LlmEndpoint,
    pub backup: Option<LlmEndpoint>,
    pub retries: u32,
}

impl LlmSettings {
    /// Required: OPENAI_BASE_URL / OPENAI_API_KEY / OPENAI_MODEL.
    /// A backup endpoint exists when at least one OPENAI_BACKUP_* value is
    /// set; unset backup fields inherit the primary's values.
    pub fn from_env() -> Result<Self> {
        let primary = LlmEndpoint {
            base_url: env_opt("OPENAI_BASE_URL")
                .ok_or_else(|| anyhow!("OPENAI_BASE_URL is not set"))?,
            api_key: env_opt("OPENAI_API_KEY")
                .ok_or_else(|| anyhow!("OPENAI_API_KEY is not set"))?,
            model: env_opt("OPENAI_MODEL").ok_or_else(|| anyhow!("OPENAI_MODEL is not set"))?,
        };

        let backup_base = env_opt("OPENAI_BACKUP_BASE_URL");
        let backup_key = env_opt("OPENAI_BACKUP_API_KEY");
        let backup_model = env_opt("OPENAI_BACKUP_MODEL");
        let backup = if backup_base.is_some() || backup_key.is_some() || backup_model.is_some() {
            Some(LlmEndpoint {
                base_url: backup_base.unwrap_or_else(|| primary.base_url.clone()),
                api_key: backup_key.unwrap_or_else(|| primary.api_key.clone()),
                model: backup_model.unwrap_or_else(|| primary.model.clone()),
            })
        } else {
            None
        };

        let retries = env_opt("LLM_RETRIES")
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(3);

        Ok(Self {
            primary,
            backup,
            retries,
        })
    }
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
