//! News Pipeline Service, binary entrypoint.
//! Boots the Axum HTTP server, wiring the store, harvester, enricher, and
//! the trigger/query routes.

use std::sync::Arc;

use shuttle_axum::ShuttleAxum;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use news_prism::analyze::ai_adapter::build_analyst;
use news_prism::api;
use news_prism::enrich::EnrichConfig;
use news_prism::ingest::rss::HttpFetcher;
use news_prism::ingest::HarvestConfig;
use news_prism::metrics::Metrics;
use news_prism::scheduler::{spawn_pipeline_scheduler, PipelineSchedulerCfg};
use news_prism::store::MemoryStore;

/// Enable compact tracing logs in development only.
/// Activation requires BOTH:
///   - dev environment (debug build OR SHUTTLE_ENV in {local, development, dev})
///   - PIPELINE_DEV_LOG=1
fn enable_dev_tracing() {
    let dev_flag = std::env::var("PIPELINE_DEV_LOG")
        .ok()
        .is_some_and(|v| v == "1");

    let is_dev_env = cfg!(debug_assertions)
        || matches!(
            std::env::var("SHUTTLE_ENV")
                .unwrap_or_default()
                .to_ascii_lowercase()
                .as_str(),
            "local" | "development" | "dev"
        );

    if !(dev_flag && is_dev_env) {
        return;
    }

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("news_prism=info,warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments. This enables
    // NEWS_FEEDS_PATH / OPENAI_API_KEY / PIPELINE_TICK_SECS from .env.
    let _ = dotenvy::dotenv();

    enable_dev_tracing();

    let harvest_cfg = HarvestConfig::default();
    let enrich_cfg = EnrichConfig::default();

    let metrics = Metrics::init(harvest_cfg.retention_window.num_days());

    let state = api::build_state(
        Arc::new(MemoryStore::new()),
        Arc::new(HttpFetcher::new()),
        build_analyst(),
        harvest_cfg,
        enrich_cfg,
    );

    // Optional background pipeline ticker; HTTP triggers work either way.
    if let Some(interval_secs) = std::env::var("PIPELINE_TICK_SECS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
    {
        spawn_pipeline_scheduler(
            Arc::clone(&state.harvester),
            Arc::clone(&state.enricher),
            PipelineSchedulerCfg {
                interval_secs,
                queue_batch: 10,
            },
        );
    }

    let router = api::create_router(state).merge(metrics.router());

    Ok(router.into())
}
