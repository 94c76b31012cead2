// The read-only HTTP surface over a seeded in-memory database, driven
// through the router with oneshot requests.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::Utc;
use serde_json::Value;
use tower::ServiceExt;
use world_brief::api::AppState;
use world_brief::create_router;
use world_brief::ingest::RunWindow;
use world_brief::store::{EventReference, NewEvent, Store};
use world_brief::NormalizedArticle;

async fn seeded_store(run_count: usize) -> (Store, Vec<String>) {
    let store = Store::connect_in_memory().await.unwrap();
    store.migrate().await.unwrap();

    let stored = store
        .upsert_articles(&[NormalizedArticle {
            source: "bbc".to_string(),
            title: "Storm hits coast".to_string(),
            link: "https://example.test/storm".to_string(),
            summary: "short".to_string(),
            content: Some("long body".to_string()),
            published_at: Some(Utc::now()),
            guid: None,
            authors: Vec::new(),
            categories: Vec::new(),
            image_url: None,
        }])
        .await
        .unwrap();

    let window = RunWindow::trailing(Utc::now(), 480);
    let mut run_ids = Vec::with_capacity(run_count);
    for i in 0..run_count {
        let event = NewEvent {
            title: format!("event {i}"),
            summary: "what happened".to_string(),
            references: vec![EventReference {
                source: "bbc".to_string(),
                title: "Storm hits coast".to_string(),
                link: "https://example.test/storm".to_string(),
                published_at: None,
            }],
            article_ids: vec![stored[0].id.clone()],
        };
        run_ids.push(store.create_run_with_events(&window, &[event]).await.unwrap());
    }
    (store, run_ids)
}

async fn get_json(store: &Store, uri: &str) -> (StatusCode, Value) {
    let app = create_router(AppState {
        store: store.clone(),
    });
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, json)
}

#[tokio::test]
async fn health_answers_ok() {
    let (store, _) = seeded_store(0).await;
    let app = create_router(AppState { store });
    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn runs_list_pages_newest_first_with_camel_case_fields() {
    let (store, _) = seeded_store(3).await;

    let (status, json) = get_json(&store, "/api/runs?page=1&pageSize=2").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["page"], 1);
    assert_eq!(json["pageSize"], 2);
    assert_eq!(json["total"], 3);
    assert_eq!(json["totalPages"], 2);
    let runs = json["runs"].as_array().unwrap();
    assert_eq!(runs.len(), 2);
    assert_eq!(runs[0]["eventCount"], 1);
    assert!(runs[0]["windowStart"].is_string());
    assert!(runs[0]["createdAt"].is_string());

    let (_, last_page) = get_json(&store, "/api/runs?page=2&pageSize=2").await;
    assert_eq!(last_page["runs"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn garbage_paging_params_fall_back_to_defaults() {
    let (store, _) = seeded_store(1).await;

    let (status, json) = get_json(&store, "/api/runs?page=zero&pageSize=-3").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["page"], 1);
    assert_eq!(json["pageSize"], 10);

    // Oversized pages are clamped, not honored.
    let (_, clamped) = get_json(&store, "/api/runs?pageSize=500").await;
    assert_eq!(clamped["pageSize"], 20);

    // A page number beyond i64 still answers with an empty page.
    let (status, huge) = get_json(&store, "/api/runs?page=1e300").await;
    assert_eq!(status, StatusCode::OK);
    assert!(huge["runs"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn run_detail_returns_hydrated_events_or_404() {
    let (store, run_ids) = seeded_store(1).await;

    let (status, json) = get_json(&store, &format!("/api/runs/{}", run_ids[0])).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["id"], run_ids[0].as_str());
    let events = json["events"].as_array().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["title"], "event 0");
    let references = events[0]["references"].as_array().unwrap();
    assert_eq!(references[0]["link"], "https://example.test/storm");
    assert_eq!(references[0]["content"], "long body");

    let (status, _) = get_json(&store, "/api/runs/not-a-run").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
