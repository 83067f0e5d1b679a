// src/ingest/mod.rs
pub mod rss;

use std::sync::Arc;

use chrono::{Duration, Utc};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge};
use once_cell::sync::OnceCell;
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::article::Article;
use crate::feeds::{FeedRegistry, FeedSource};
use crate::ingest::rss::{parse_feed, FeedFetch, FetchError};
use crate::store::{ArticleStore, StoreError};

/// One-time metrics registration (so series show up on /metrics).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("harvest_new_total", "Article stubs written by harvest runs.");
        describe_counter!(
            "harvest_duplicate_total",
            "Entries skipped because the URL already exists."
        );
        describe_counter!(
            "harvest_feed_errors_total",
            "Per-feed fetch/parse failures."
        );
        describe_histogram!("harvest_parse_ms", "Feed parse time in milliseconds.");
        describe_gauge!("harvest_last_run_ts", "Unix ts when harvest last ran.");
    });
}

/// Harvest tunables. Recency window and per-feed cap bound how much of a
/// feed's backlog one run will ingest.
#[derive(Debug, Clone, Copy)]
pub struct HarvestConfig {
    pub max_per_feed: usize,
    pub recency_window: Duration,
    pub retention_window: Duration,
    pub max_concurrent_fetches: usize,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            max_per_feed: 12,
            recency_window: Duration::hours(48),
            retention_window: Duration::days(7),
            max_concurrent_fetches: 4,
        }
    }
}

/// Outcome of one harvest run across all registered feeds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HarvestReport {
    pub new_count: usize,
    pub duplicate_count: usize,
    pub error_count: usize,
}

enum FeedFailure {
    Fetch(FetchError),
    Store(StoreError),
}

pub struct Harvester {
    fetcher: Arc<dyn FeedFetch>,
    store: Arc<dyn ArticleStore>,
    cfg: HarvestConfig,
}

impl Harvester {
    pub fn new(
        fetcher: Arc<dyn FeedFetch>,
        store: Arc<dyn ArticleStore>,
        cfg: HarvestConfig,
    ) -> Self {
        Self { fetcher, store, cfg }
    }

    /// Poll every registered feed once, writing unseen entries as pending
    /// stubs. Per-feed fetch/parse failures are logged and counted without
    /// touching the other feeds; a store failure aborts the run. Safe to
    /// run concurrently with itself and with the enricher: the URL
    /// existence check is the sole dedup guard, and a same-URL race
    /// resolves last-write-wins over identical content.
    pub async fn harvest(&self, registry: &FeedRegistry) -> Result<HarvestReport, StoreError> {
        ensure_metrics_described();
        let cutoff = Utc::now() - self.cfg.recency_window;
        tracing::info!(feeds = registry.len(), %cutoff, "harvest run starting");

        let semaphore = Arc::new(Semaphore::new(self.cfg.max_concurrent_fetches.max(1)));
        let mut tasks: JoinSet<Result<(usize, usize), FeedFailure>> = JoinSet::new();

        for feed in registry.feeds.iter().cloned() {
            let fetcher = Arc::clone(&self.fetcher);
            let store = Arc::clone(&self.store);
            let semaphore = Arc::clone(&semaphore);
            let cfg = self.cfg;
            tasks.spawn(async move {
                let _permit = semaphore.acquire().await.expect("semaphore closed");
                harvest_one_feed(&*fetcher, &*store, &feed, cfg, cutoff).await
            });
        }

        let mut report = HarvestReport::default();
        let mut store_error = None;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok((new, dup))) => {
                    report.new_count += new;
                    report.duplicate_count += dup;
                }
                Ok(Err(FeedFailure::Fetch(e))) => {
                    tracing::warn!(error = %e, "feed failed, skipping");
                    counter!("harvest_feed_errors_total").increment(1);
                    report.error_count += 1;
                }
                Ok(Err(FeedFailure::Store(e))) => {
                    store_error = Some(e);
                }
                Err(join_err) => {
                    tracing::warn!(error = %join_err, "harvest task aborted");
                    report.error_count += 1;
                }
            }
        }
        if let Some(e) = store_error {
            return Err(e);
        }

        counter!("harvest_new_total").increment(report.new_count as u64);
        counter!("harvest_duplicate_total").increment(report.duplicate_count as u64);
        gauge!("harvest_last_run_ts").set(Utc::now().timestamp().max(0) as f64);
        tracing::info!(
            new = report.new_count,
            duplicate = report.duplicate_count,
            errors = report.error_count,
            "harvest run finished"
        );
        Ok(report)
    }
}

async fn harvest_one_feed(
    fetcher: &dyn FeedFetch,
    store: &dyn ArticleStore,
    feed: &FeedSource,
    cfg: HarvestConfig,
    cutoff: chrono::DateTime<Utc>,
) -> Result<(usize, usize), FeedFailure> {
    let body = fetcher.fetch(&feed.url).await.map_err(FeedFailure::Fetch)?;
    let items = parse_feed(&feed.url, &body).map_err(FeedFailure::Fetch)?;

    let mut new_count = 0usize;
    let mut duplicate_count = 0usize;
    for item in items {
        if new_count >= cfg.max_per_feed {
            break;
        }
        // Entries with no parseable publish date, or older than the
        // recency window, are not ingested.
        match item.published_at {
            Some(ts) if ts >= cutoff => {}
            _ => continue,
        }

        if store.exists(&item.url).await.map_err(FeedFailure::Store)? {
            duplicate_count += 1;
            continue;
        }
        let stub = Article::stub(
            item.url,
            item.headline,
            item.raw_content,
            feed.category.clone(),
            feed.bias_prior,
            Utc::now(),
            cfg.retention_window,
        );
        store.put(stub).await.map_err(FeedFailure::Store)?;
        new_count += 1;
    }

    tracing::debug!(
        feed = %feed.url,
        category = %feed.category,
        new = new_count,
        duplicate = duplicate_count,
        "feed harvested"
    );
    Ok((new_count, duplicate_count))
}
