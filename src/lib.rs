// src/lib.rs
// Public library surface for integration tests (and the two binaries).

pub mod api;
pub mod config;
pub mod enrich;
pub mod extract;
pub mod ingest;
pub mod llm;
pub mod metrics;
pub mod pipeline;
pub mod store;

// ---- Re-exports for stable public API ----
pub use crate::api::create_router;
pub use crate::ingest::types::{NormalizedArticle, RssSource};
pub use crate::pipeline::{PipelineDeps, RunOutcome};
pub use crate::store::{RunGuard, Store};

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize compact tracing for a binary entrypoint.
/// `RUST_LOG` wins; otherwise default to info for this crate.
pub fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("world_brief=info,warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}
