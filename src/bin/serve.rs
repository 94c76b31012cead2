//! serve — Read API Binary Entrypoint
//! Boots the Axum server exposing the persisted runs plus /metrics.

use anyhow::{Context, Result};
use tracing::info;

use world_brief::api::{self, AppState};
use world_brief::metrics::Metrics;
use world_brief::store::Store;

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    world_brief::init_tracing();

    let metrics = Metrics::init();

    let database_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://world_brief.db".to_string());
    let store = Store::connect(&database_url).await?;
    store.migrate().await?;

    let router = api::create_router(AppState { store }).merge(metrics.router());

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(8080);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("binding port {port}"))?;
    info!(port, "serving read api");
    axum::serve(listener, router).await.context("server exited")?;
    Ok(())
}
