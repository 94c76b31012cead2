// src/llm/client.rs
// Chat-completion client: bounded retry with exponential backoff, explicit
// terminal-vs-retryable classification, and primary→backup endpoint
// failover with a fresh budget.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::{LlmEndpoint, LlmSettings};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);
const BACKOFF_BASE: Duration = Duration::from_secs(1);
const BACKOFF_CAP: Duration = Duration::from_secs(20);

#[derive(Debug, Error)]
pub enum LlmError {
    /// Client-error status other than 429. Never retried.
    #[error("llm endpoint returned {status}: {body}")]
    Terminal { status: u16, body: String },
    /// Retry budget spent on retryable failures (429/5xx/network/timeout).
    #[error("llm request failed after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: String },
    /// Primary and backup both failed; both causes surfaced.
    #[error("primary endpoint failed: {primary}; backup endpoint failed: {backup}")]
    FailedOver {
        primary: Box<LlmError>,
        backup: Box<LlmError>,
    },
}

#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Issue one structured completion and return the trimmed first-choice
    /// content. An absent or empty choice is `Ok("")`, not an error.
    async fn complete(&self, system: Option<&str>, user: &str) -> Result<String, LlmError>;
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Default, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Default, Deserialize)]
struct Choice {
    #[serde(default)]
    message: ChoiceMessage,
}

#[derive(Debug, Default, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

enum AttemptFailure {
    Terminal { status: u16, body: String },
    Retryable(String),
}

pub struct OpenAiChatClient {
    http: reqwest::Client,
    settings: LlmSettings,
    backoff_base: Duration,
}

impl OpenAiChatClient {
    pub fn new(settings: LlmSettings) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            settings,
            backoff_base: BACKOFF_BASE,
        })
    }

    /// Shrink the backoff base; used by tests to keep retries fast.
    pub fn with_backoff_base(mut self, base: Duration) -> Self {
        self.backoff_base = base;
        self
    }

    async fn attempt(
        &self,
        endpoint: &LlmEndpoint,
        system: Option<&str>,
        user: &str,
    ) -> Result<String, AttemptFailure> {
        let url = format!("{}/chat/completions", endpoint.base_url.trim_end_matches('/'));
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = system {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: user,
        });
        let request = ChatRequest {
            model: &endpoint.model,
            messages,
        };

        let response = self
            .http
            .post(&url)
            .bearer_auth(&endpoint.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|err| AttemptFailure::Retryable(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            if status.is_client_error() && status.as_u16() != 429 {
                return Err(AttemptFailure::Terminal {
                    status: status.as_u16(),
                    body,
                });
            }
            return Err(AttemptFailure::Retryable(format!(
                "status {status}: {body}"
            )));
        }

        let payload: ChatResponse = response
            .json()
            .await
            .map_err(|err| AttemptFailure::Retryable(err.to_string()))?;

        Ok(payload
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .unwrap_or_default())
    }

    /// Retry loop against one endpoint: `retries + 1` attempts, factor-2
    /// backoff from the base, capped.
    async fn complete_endpoint(
        &self,
        endpoint: &LlmEndpoint,
        system: Option<&str>,
        user: &str,
    ) -> Result<String, LlmError> {
        let max_attempts = self.settings.retries + 1;
        let mut last_failure = String::new();

        for attempt in 0..max_attempts {
            if attempt > 0 {
                let backoff = backoff_delay(self.backoff_base, attempt - 1);
                debug!(attempt, backoff_ms = backoff.as_millis() as u64, "retrying llm request");
                tokio::time::sleep(backoff).await;
            }

            match self.attempt(endpoint, system, user).await {
                Ok(content) => return Ok(content),
                Err(AttemptFailure::Terminal { status, body }) => {
                    return Err(LlmError::Terminal { status, body });
                }
                Err(AttemptFailure::Retryable(message)) => {
                    warn!(
                        attempt = attempt + 1,
                        max_attempts,
                        model = %endpoint.model,
                        error = %message,
                        "llm request failed, will retry if budget remains"
                    );
                    last_failure = message;
                }
            }
        }

        Err(LlmError::Exhausted {
            attempts: max_attempts,
            last: last_failure,
        })
    }
}

#[async_trait]
impl ChatClient for OpenAiChatClient {
    async fn complete(&self, system: Option<&str>, user: &str) -> Result<String, LlmError> {
        let primary_err = match self
            .complete_endpoint(&self.settings.primary, system, user)
            .await
        {
            Ok(content) => return Ok(content),
            Err(err) => err,
        };

        let Some(backup) = &self.settings.backup else {
            return Err(primary_err);
        };

        warn!(error = %primary_err, "primary llm endpoint failed, trying backup");
        match self.complete_endpoint(backup, system, user).await {
            Ok(content) => Ok(content),
            Err(backup_err) => Err(LlmError::FailedOver {
                primary: Box::new(primary_err),
                backup: Box::new(backup_err),
            }),
        }
    }
}

fn backoff_delay(base: Duration, exponent: u32) -> Duration {
    let factor = 2u32.saturating_pow(exponent.min(16));
    (base * factor).min(BACKOFF_CAP)
}
