// src/store/mod.rs
// SQLite persistence: idempotent article upserts, the all-or-nothing run
// write, the read queries behind the API, and the cross-invocation run
// guard.

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use tracing::{info, warn};
use uuid::Uuid;

use crate::ingest::types::NormalizedArticle;
use crate::ingest::RunWindow;

pub const RUN_LOCK_ID: &str = "agent";

/// A reference snapshot frozen into an event at persistence time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventReference {
    pub source: String,
    pub title: String,
    pub link: String,
    pub published_at: Option<DateTime<Utc>>,
}

/// One summarized event ready to persist.
#[derive(Debug, Clone)]
pub struct NewEvent {
    pub title: String,
    pub summary: String,
    pub references: Vec<EventReference>,
    pub article_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredArticle {
    pub id: String,
    pub link: String,
    pub title: String,
    pub source: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub id: String,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub event_count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct HydratedReference {
    pub source: String,
    pub title: String,
    pub link: String,
    pub published_at: Option<DateTime<Utc>>,
    pub content: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EventDetail {
    pub id: String,
    pub title: String,
    pub summary: String,
    pub created_at: DateTime<Utc>,
    pub references: Vec<HydratedReference>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunDetail {
    pub id: String,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub events: Vec<EventDetail>,
}

#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Open (and create if missing) the database at `url`, with foreign
    /// keys enforced on every pooled connection.
    pub async fn connect(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .with_context(|| format!("parsing database url {url}"))?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .context("connecting to sqlite")?;
        Ok(Self { pool })
    }

    /// In-memory database on a single connection; used by tests.
    pub async fn connect_in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("running migrations")?;
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Upsert every article by canonical link, in one transaction. Upserts
    /// are idempotent and intentionally independent of the run write:
    /// articles are shared across runs. A null publish timestamp leaves the
    /// stored one untouched.
    pub async fn upsert_articles(
        &self,
        articles: &[NormalizedArticle],
    ) -> Result<Vec<StoredArticle>> {
        if articles.is_empty() {
            return Ok(Vec::new());
        }

        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        let mut stored = Vec::with_capacity(articles.len());
        for article in articles {
            let content = article
                .content
                .clone()
                .filter(|c| !c.is_empty())
                .or_else(|| Some(article.summary.clone()).filter(|s| !s.is_empty()))
                .unwrap_or_else(|| article.title.clone());

            let row = sqlx::query(
                r#"
                INSERT INTO articles (id, link, source, title, content, published_at, created_at, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
                ON CONFLICT(link) DO UPDATE SET
                    title = excluded.title,
                    content = excluded.content,
                    published_at = COALESCE(excluded.published_at, articles.published_at),
                    updated_at = excluded.updated_at
                RETURNING id, link, title, source
                "#,
            )
            .bind(Uuid::new_v4().to_string())
            .bind(&article.link)
            .bind(&article.source)
            .bind(&article.title)
            .bind(&content)
            .bind(article.published_at)
            .bind(now)
            .fetch_one(&mut *tx)
            .await
            .with_context(|| format!("upserting article {}", article.link))?;

            stored.push(StoredArticle {
                id: row.try_get("id")?,
                link: row.try_get("link")?,
                title: row.try_get("title")?,
                source: row.try_get("source")?,
            });
        }
        tx.commit().await?;
        Ok(stored)
    }

    /// Persist one run and all of its events atomically. Either the run row,
    /// every event, and every (event, article) link land together, or none
    /// do. Duplicate link rows are ignored, not errors.
    pub async fn create_run_with_events(
        &self,
        window: &RunWindow,
        events: &[NewEvent],
    ) -> Result<String> {
        let run_id = Uuid::new_v4().to_string();
        let now = Utc::now();

        let mut tx = self.pool.begin().await?;
        sqlx::query("INSERT INTO runs (id, window_start, window_end, created_at) VALUES (?1, ?2, ?3, ?4)")
            .bind(&run_id)
            .bind(window.start)
            .bind(window.end)
            .bind(now)
            .execute(&mut *tx)
            .await
            .context("inserting run")?;

        for (position, event) in events.iter().enumerate() {
            let event_id = Uuid::new_v4().to_string();
            let refs_json =
                serde_json::to_string(&event.references).context("serializing references")?;
            sqlx::query(
                r#"
                INSERT INTO events (id, run_id, position, title, summary, refs, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
            )
            .bind(&event_id)
            .bind(&run_id)
            .bind(position as i64)
            .bind(&event.title)
            .bind(&event.summary)
            .bind(&refs_json)
            .bind(now)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("inserting event {}", event.title))?;

            for article_id in &event.article_ids {
                sqlx::query(
                    "INSERT INTO event_articles (event_id, article_id) VALUES (?1, ?2) \
                     ON CONFLICT DO NOTHING",
                )
                .bind(&event_id)
                .bind(article_id)
                .execute(&mut *tx)
                .await
                .context("inserting event article link")?;
            }
        }

        tx.commit().await.context("committing run write")?;
        Ok(run_id)
    }

    pub async fn count_runs(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM runs")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get("n")?)
    }

    /// Newest-first page of runs with their event counts. An absurd page
    /// number is a valid request for an empty page, never a panic.
    pub async fn list_runs(&self, page: i64, page_size: i64) -> Result<Vec<RunSummary>> {
        let offset = page.saturating_sub(1).saturating_mul(page_size);
        let rows = sqlx::query(
            r#"
            SELECT r.id, r.window_start, r.window_end, r.created_at,
                   (SELECT COUNT(*) FROM events e WHERE e.run_id = r.id) AS event_count
            FROM runs r
            ORDER BY r.created_at DESC, r.id
            LIMIT ?1 OFFSET ?2
            "#,
        )
        .bind(page_size)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(RunSummary {
                    id: row.try_get("id")?,
                    window_start: row.try_get("window_start")?,
                    window_end: row.try_get("window_end")?,
                    created_at: row.try_get("created_at")?,
                    event_count: row.try_get("event_count")?,
                })
            })
            .collect()
    }

    /// Full run detail: events in creation order with reference snapshots,
    /// hydrating each reference's `content` from the linked article row
    /// with the same link.
    pub async fn run_detail(&self, id: &str) -> Result<Option<RunDetail>> {
        let Some(run_row) = sqlx::query(
            "SELECT id, window_start, window_end, created_at FROM runs WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        else {
            return Ok(None);
        };

        let event_rows = sqlx::query(
            "SELECT id, title, summary, refs, created_at FROM events \
             WHERE run_id = ?1 ORDER BY position ASC",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        let mut events = Vec::with_capacity(event_rows.len());
        for row in event_rows {
            let event_id: String = row.try_get("id")?;
            let refs_json: String = row.try_get("refs")?;
            let references: Vec<EventReference> =
                serde_json::from_str(&refs_json).unwrap_or_default();

            let article_rows = sqlx::query(
                "SELECT a.link, a.content FROM event_articles ea \
                 JOIN articles a ON a.id = ea.article_id WHERE ea.event_id = ?1",
            )
            .bind(&event_id)
            .fetch_all(&self.pool)
            .await?;
            let content_by_link: HashMap<String, String> = article_rows
                .into_iter()
                .map(|row| Ok((row.try_get("link")?, row.try_get("content")?)))
                .collect::<Result<_, sqlx::Error>>()?;

            let references = references
                .into_iter()
                .map(|reference| {
                    let content = content_by_link.get(&reference.link).cloned();
                    HydratedReference {
                        source: reference.source,
                        title: reference.title,
                        link: reference.link,
                        published_at: reference.published_at,
                        content,
                    }
                })
                .collect();

            events.push(EventDetail {
                id: event_id,
                title: row.try_get("title")?,
                summary: row.try_get("summary")?,
                created_at: row.try_get("created_at")?,
                references,
            });
        }

        Ok(Some(RunDetail {
            id: run_row.try_get("id")?,
            window_start: run_row.try_get("window_start")?,
            window_end: run_row.try_get("window_end")?,
            created_at: run_row.try_get("created_at")?,
            events,
        }))
    }
}

/// Mutual exclusion over independently-scheduled invocations: at most one
/// pipeline run active system-wide, with stale-lock recovery. Swappable so
/// tests can use an in-memory fake.
#[async_trait]
pub trait RunGuard: Send + Sync {
    /// True when this invocation may run. Acquisition is a single atomic
    /// conditional write: create the lock if absent, or steal it when its
    /// timestamp is older than `stale_after`.
    async fn try_acquire(&self, now: DateTime<Utc>, stale_after: Duration) -> Result<bool>;

    /// Delete the lock. Called on every run disposition, success or not.
    async fn release(&self) -> Result<()>;
}

pub struct SqlRunGuard {
    pool: SqlitePool,
}

impl SqlRunGuard {
    pub fn new(store: &Store) -> Self {
        Self {
            pool: store.pool().clone(),
        }
    }

    /// Timestamp of the current lock holder, if any.
    pub async fn held_since(&self) -> Result<Option<DateTime<Utc>>> {
        let row = sqlx::query("SELECT started_at FROM run_lock WHERE id = ?1")
            .bind(RUN_LOCK_ID)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.and_then(|row| {
            let secs: i64 = row.try_get("started_at").ok()?;
            DateTime::<Utc>::from_timestamp(secs, 0)
        }))
    }
}

#[async_trait]
impl RunGuard for SqlRunGuard {
    async fn try_acquire(&self, now: DateTime<Utc>, stale_after: Duration) -> Result<bool> {
        let cutoff = now.timestamp() - stale_after.as_secs() as i64;
        let result = sqlx::query(
            r#"
            INSERT INTO run_lock (id, started_at) VALUES (?1, ?2)
            ON CONFLICT(id) DO UPDATE SET started_at = excluded.started_at
            WHERE run_lock.started_at < ?3
            "#,
        )
        .bind(RUN_LOCK_ID)
        .bind(now.timestamp())
        .bind(cutoff)
        .execute(&self.pool)
        .await
        .context("acquiring run lock")?;

        let acquired = result.rows_affected() == 1;
        if acquired {
            info!(started_at = now.timestamp(), "run lock acquired");
        }
        Ok(acquired)
    }

    async fn release(&self) -> Result<()> {
        let result = sqlx::query("DELETE FROM run_lock WHERE id = ?1")
            .bind(RUN_LOCK_ID)
            .execute(&self.pool)
            .await
            .context("releasing run lock")?;
        if result.rows_affected() == 0 {
            warn!("run lock was already released");
        }
        Ok(())
    }
}
