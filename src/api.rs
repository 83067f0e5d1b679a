//! HTTP trigger surface. Thin by design: every route maps 1:1 onto a core
//! contract (harvest, process-queue, backfill) or a query-layer read. The
//! routing layer owns nothing the core depends on.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;

use crate::article::Article;
use crate::backfill::BackfillController;
use crate::enrich::{EnrichReport, Enricher};
use crate::feeds::FeedRegistry;
use crate::ingest::{HarvestReport, Harvester};
use crate::query::{self, TranslateQuery, FEED_LIMIT, SEARCH_LIMIT};
use crate::similar;
use crate::store::ArticleStore;

/// Default batch size for one enrichment pass.
const DEFAULT_QUEUE_BATCH: usize = 10;
/// Default staleness cutoff for backfill triggers.
const DEFAULT_BACKFILL_HOURS: i64 = 2;
/// Cap on similar-article responses.
const SIMILAR_LIMIT: usize = 10;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ArticleStore>,
    pub harvester: Arc<Harvester>,
    pub enricher: Arc<Enricher>,
    pub backfill: Arc<BackfillController>,
    pub translator: Arc<dyn TranslateQuery>,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/api/harvest", post(trigger_harvest))
        .route("/api/process-queue", post(trigger_process_queue))
        .route("/api/backfill", post(trigger_backfill))
        .route("/api/feed", get(get_feed))
        .route("/api/available-dates", get(get_available_dates))
        .route("/api/similar", get(get_similar))
        .route("/api/search", post(search_articles))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

type ApiError = (StatusCode, String);

fn internal(e: impl std::fmt::Display) -> ApiError {
    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

#[derive(Serialize)]
struct HarvestResp {
    #[serde(flatten)]
    report: HarvestReport,
    message: &'static str,
}

/// Phase 1: harvest all registered feeds into pending stubs, then kick
/// off queue draining in the background so the trigger returns fast.
async fn trigger_harvest(State(state): State<AppState>) -> Result<Json<HarvestResp>, ApiError> {
    let registry = FeedRegistry::load_default().map_err(internal)?;
    let report = state.harvester.harvest(&registry).await.map_err(internal)?;

    let enricher = Arc::clone(&state.enricher);
    tokio::spawn(async move {
        enricher.drain(DEFAULT_QUEUE_BATCH).await;
    });

    Ok(Json(HarvestResp {
        report,
        message: "harvest complete, background enrichment started",
    }))
}

#[derive(Deserialize)]
struct ProcessQueueParams {
    max_items: Option<usize>,
}

/// Phase 2: process pending articles inline and report the outcome.
async fn trigger_process_queue(
    State(state): State<AppState>,
    Query(params): Query<ProcessQueueParams>,
) -> Result<Json<EnrichReport>, ApiError> {
    let max_items = params.max_items.unwrap_or(DEFAULT_QUEUE_BATCH);
    let report = state
        .enricher
        .process_queue(max_items)
        .await
        .map_err(internal)?;
    Ok(Json(report))
}

#[derive(Deserialize)]
struct BackfillParams {
    older_than_hours: Option<i64>,
}

#[derive(Serialize)]
struct BackfillResp {
    requeued: usize,
}

async fn trigger_backfill(
    State(state): State<AppState>,
    Query(params): Query<BackfillParams>,
) -> Result<Json<BackfillResp>, ApiError> {
    let hours = params.older_than_hours.unwrap_or(DEFAULT_BACKFILL_HOURS);
    let requeued = state
        .backfill
        .backfill(Duration::hours(hours))
        .await
        .map_err(internal)?;
    Ok(Json(BackfillResp { requeued }))
}

#[derive(Deserialize)]
struct FeedParams {
    date: Option<String>,
}

async fn get_feed(
    State(state): State<AppState>,
    Query(params): Query<FeedParams>,
) -> Result<Json<Vec<Article>>, ApiError> {
    // An unparseable date is ignored rather than rejected.
    let date = params
        .date
        .as_deref()
        .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok());
    let articles = query::feed_for_date(&*state.store, date, FEED_LIMIT)
        .await
        .map_err(internal)?;
    Ok(Json(articles))
}

async fn get_available_dates(
    State(state): State<AppState>,
) -> Result<Json<Vec<String>>, ApiError> {
    let dates = query::available_dates(&*state.store)
        .await
        .map_err(internal)?;
    Ok(Json(dates))
}

#[derive(Deserialize)]
struct SimilarParams {
    url: String,
}

async fn get_similar(
    State(state): State<AppState>,
    Query(params): Query<SimilarParams>,
) -> Result<Json<Vec<Article>>, ApiError> {
    let Some(article) = state.store.get(&params.url).await.map_err(internal)? else {
        return Err((StatusCode::NOT_FOUND, "unknown article url".to_string()));
    };
    let mut matches = similar::find_similar(&*state.store, &article)
        .await
        .map_err(internal)?;
    matches.truncate(SIMILAR_LIMIT);
    Ok(Json(matches))
}

#[derive(Deserialize)]
struct SearchReq {
    query: String,
}

#[derive(Serialize)]
struct SearchResp {
    results: Vec<Article>,
}

/// Natural-language search: the translator is a black box producing a
/// structured query; the core only executes the result.
async fn search_articles(
    State(state): State<AppState>,
    Json(body): Json<SearchReq>,
) -> Result<Json<SearchResp>, ApiError> {
    let structured = state.translator.translate(&body.query).await;
    let results = query::search(&*state.store, &structured, SEARCH_LIMIT)
        .await
        .map_err(internal)?;
    Ok(Json(SearchResp { results }))
}

/// Convenience used by the binary and integration tests: wire default
/// components around the given store and analyst.
pub fn build_state(
    store: Arc<dyn ArticleStore>,
    fetcher: Arc<dyn crate::ingest::rss::FeedFetch>,
    analyst: crate::analyze::ai_adapter::DynAnalyst,
    harvest_cfg: crate::ingest::HarvestConfig,
    enrich_cfg: crate::enrich::EnrichConfig,
) -> AppState {
    let harvester = Arc::new(Harvester::new(fetcher, Arc::clone(&store), harvest_cfg));
    let enricher = Arc::new(Enricher::new(Arc::clone(&store), analyst, enrich_cfg));
    let backfill = Arc::new(BackfillController::new(Arc::clone(&store)));
    AppState {
        store,
        harvester,
        enricher,
        backfill,
        translator: Arc::new(crate::query::KeywordTranslator),
    }
}
