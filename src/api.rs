// src/api.rs
// Read-only HTTP surface over the persisted store: a paginated run list
// and a per-run detail view. Consumed by the browser UI; never writes.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tracing::error;

use crate::store::{RunDetail, RunSummary, Store};

const DEFAULT_PAGE_SIZE: i64 = 10;
const MAX_PAGE_SIZE: i64 = 20;

#[derive(Clone)]
pub struct AppState {
    pub store: Store,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/api/runs", get(list_runs))
        .route("/api/runs/{id}", get(run_detail))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct RunsQuery {
    page: Option<String>,
    #[serde(rename = "pageSize")]
    page_size: Option<String>,
}

#[derive(Debug, Serialize)]
struct RunsResponse {
    page: i64,
    #[serde(rename = "pageSize")]
    page_size: i64,
    total: i64,
    #[serde(rename = "totalPages")]
    total_pages: i64,
    runs: Vec<RunListItem>,
}

#[derive(Debug, Serialize)]
struct RunListItem {
    id: String,
    #[serde(rename = "windowStart")]
    window_start: chrono::DateTime<chrono::Utc>,
    #[serde(rename = "windowEnd")]
    window_end: chrono::DateTime<chrono::Utc>,
    #[serde(rename = "createdAt")]
    created_at: chrono::DateTime<chrono::Utc>,
    #[serde(rename = "eventCount")]
    event_count: i64,
}

/// Positive integer or the fallback; mirrors the lenient query parsing the
/// UI has always relied on.
fn parse_positive(value: Option<&str>, fallback: i64) -> i64 {
    value
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite() && *v > 0.0)
        .map(|v| v.floor() as i64)
        .unwrap_or(fallback)
}

async fn list_runs(
    State(state): State<AppState>,
    Query(query): Query<RunsQuery>,
) -> Result<Json<RunsResponse>, StatusCode> {
    let page = parse_positive(query.page.as_deref(), 1);
    let page_size = parse_positive(query.page_size.as_deref(), DEFAULT_PAGE_SIZE).min(MAX_PAGE_SIZE);

    let total = state.store.count_runs().await.map_err(internal)?;
    let runs = state
        .store
        .list_runs(page, page_size)
        .await
        .map_err(internal)?;

    let total_pages = ((total + page_size - 1) / page_size).max(1);
    Ok(Json(RunsResponse {
        page,
        page_size,
        total,
        total_pages,
        runs: runs.into_iter().map(run_list_item).collect(),
    }))
}

fn run_list_item(run: RunSummary) -> RunListItem {
    RunListItem {
        id: run.id,
        window_start: run.window_start,
        window_end: run.window_end,
        created_at: run.created_at,
        event_count: run.event_count,
    }
}

#[derive(Debug, Serialize)]
struct RunDetailResponse {
    id: String,
    #[serde(rename = "windowStart")]
    window_start: chrono::DateTime<chrono::Utc>,
    #[serde(rename = "windowEnd")]
    window_end: chrono::DateTime<chrono::Utc>,
    #[serde(rename = "createdAt")]
    created_at: chrono::DateTime<chrono::Utc>,
    events: Vec<EventResponse>,
}

#[derive(Debug, Serialize)]
struct EventResponse {
    id: String,
    title: String,
    summary: String,
    #[serde(rename = "createdAt")]
    created_at: chrono::DateTime<chrono::Utc>,
    references: Vec<ReferenceResponse>,
}

#[derive(Debug, Serialize)]
struct ReferenceResponse {
    source: String,
    title: String,
    link: String,
    #[serde(rename = "publishedAt")]
    published_at: Option<chrono::DateTime<chrono::Utc>>,
    content: Option<String>,
}

async fn run_detail(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<RunDetailResponse>, StatusCode> {
    let detail = state.store.run_detail(&id).await.map_err(internal)?;
    let Some(detail) = detail else {
        return Err(StatusCode::NOT_FOUND);
    };
    Ok(Json(run_detail_response(detail)))
}

fn run_detail_response(detail: RunDetail) -> RunDetailResponse {
    RunDetailResponse {
        id: detail.id,
        window_start: detail.window_start,
        window_end: detail.window_end,
        created_at: detail.created_at,
        events: detail
            .events
            .into_iter()
            .map(|event| EventResponse {
                id: event.id,
                title: event.title,
                summary: event.summary,
                created_at: event.created_at,
                references: event
                    .references
                    .into_iter()
                    .map(|reference| ReferenceResponse {
                        source: reference.source,
                        title: reference.title,
                        link: reference.link,
                        published_at: reference.published_at,
                        content: reference.content,
                    })
                    .collect(),
            })
            .collect(),
    }
}

fn internal(err: anyhow::Error) -> StatusCode {
    error!(error = %err, "api query failed");
    StatusCode::INTERNAL_SERVER_ERROR
}
