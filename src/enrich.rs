//! # Enricher
//!
//! Drains the pending queue: claims a FIFO batch, fans analysis calls out
//! under a concurrency bound, merges results, and drives the
//! retry-ceiling state machine. One item's failure never aborts the
//! batch; only a store failure does.

use std::sync::Arc;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_histogram, histogram};
use once_cell::sync::OnceCell;
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::timeout;

use crate::analyze::ai_adapter::{AnalysisError, DynAnalyst};
use crate::article::{Article, ProcessingStatus};
use crate::bias;
use crate::store::{ArticleStore, StoreError};

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("enrich_succeeded_total", "Articles fully analyzed.");
        describe_counter!(
            "enrich_failed_total",
            "Per-item analysis failures (retried until the ceiling)."
        );
        describe_counter!(
            "enrich_exhausted_total",
            "Articles marked failed after hitting the retry ceiling."
        );
        describe_histogram!("enrich_analyze_ms", "AI analysis time per item in milliseconds.");
    });
}

#[derive(Debug, Clone, Copy)]
pub struct EnrichConfig {
    /// Automatic re-attempts before an item is marked `failed` and left to
    /// the backfill controller.
    pub retry_ceiling: u32,
    pub max_concurrent: usize,
    pub item_timeout: Duration,
    /// How long a claim shields an in-flight item. A cancelled run simply
    /// lets its claims lapse, reverting the items to plain pending.
    pub claim_ttl: Duration,
}

impl Default for EnrichConfig {
    fn default() -> Self {
        Self {
            retry_ceiling: 3,
            max_concurrent: 3,
            item_timeout: Duration::from_secs(45),
            claim_ttl: Duration::from_secs(120),
        }
    }
}

/// Outcome of one `process_queue` run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EnrichReport {
    pub succeeded: usize,
    pub failed: usize,
}

pub struct Enricher {
    store: Arc<dyn ArticleStore>,
    analyst: DynAnalyst,
    cfg: EnrichConfig,
}

impl Enricher {
    pub fn new(store: Arc<dyn ArticleStore>, analyst: DynAnalyst, cfg: EnrichConfig) -> Self {
        Self {
            store,
            analyst,
            cfg,
        }
    }

    /// Process up to `max_items` pending articles, oldest first. Claims
    /// guarantee at-most-one concurrent enrichment per URL even across
    /// overlapping invocations.
    pub async fn process_queue(&self, max_items: usize) -> Result<EnrichReport, StoreError> {
        ensure_metrics_described();

        let batch = self
            .store
            .claim_pending(max_items, self.cfg.claim_ttl)
            .await?;
        if batch.is_empty() {
            return Ok(EnrichReport::default());
        }
        tracing::info!(items = batch.len(), "enrich run starting");

        let semaphore = Arc::new(Semaphore::new(self.cfg.max_concurrent.max(1)));
        let mut tasks: JoinSet<Result<bool, StoreError>> = JoinSet::new();

        for article in batch {
            let store = Arc::clone(&self.store);
            let analyst = Arc::clone(&self.analyst);
            let semaphore = Arc::clone(&semaphore);
            let cfg = self.cfg;
            tasks.spawn(async move {
                let _permit = semaphore.acquire().await.expect("semaphore closed");
                enrich_one(&*store, &*analyst, article, cfg).await
            });
        }

        let mut report = EnrichReport::default();
        let mut store_error = None;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(true)) => report.succeeded += 1,
                Ok(Ok(false)) => report.failed += 1,
                Ok(Err(e)) => store_error = Some(e),
                Err(join_err) => {
                    tracing::warn!(error = %join_err, "enrich task aborted");
                    report.failed += 1;
                }
            }
        }
        if let Some(e) = store_error {
            return Err(e);
        }

        counter!("enrich_succeeded_total").increment(report.succeeded as u64);
        counter!("enrich_failed_total").increment(report.failed as u64);
        tracing::info!(
            succeeded = report.succeeded,
            failed = report.failed,
            "enrich run finished"
        );
        Ok(report)
    }

    /// Repeatedly process batches until the pending queue yields nothing.
    /// Store failures stop the drain; they are logged, not propagated,
    /// because this runs detached in the background.
    pub async fn drain(&self, batch: usize) {
        loop {
            match self.process_queue(batch).await {
                Ok(report) if report.succeeded == 0 && report.failed == 0 => break,
                Ok(_) => continue,
                Err(e) => {
                    tracing::warn!(error = %e, "queue drain stopped");
                    break;
                }
            }
        }
    }
}

/// Analyze one claimed article and write the outcome back. Returns
/// Ok(true) on success, Ok(false) on an isolated analysis failure, Err
/// only for store failures (after releasing the claim best-effort).
async fn enrich_one(
    store: &dyn ArticleStore,
    analyst: &dyn crate::analyze::ai_adapter::Analyst,
    mut article: Article,
    cfg: EnrichConfig,
) -> Result<bool, StoreError> {
    let t0 = std::time::Instant::now();
    let outcome = match timeout(cfg.item_timeout, analyst.analyze(&article.raw_content)).await {
        Ok(inner) => inner,
        Err(_elapsed) => Err(AnalysisError::Timeout),
    };
    histogram!("enrich_analyze_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);

    let write_back = match outcome {
        Ok(analysis) => {
            let label = bias::classify(article.outlet_bias_prior, analysis.content_bias);
            article.apply_analysis(analysis, label);
            tracing::debug!(url = %article.url, bias = %label, "article analyzed");
            true
        }
        Err(e) => {
            article.processing_attempts += 1;
            if article.processing_attempts >= cfg.retry_ceiling {
                article.processing_status = ProcessingStatus::Failed;
                counter!("enrich_exhausted_total").increment(1);
                tracing::warn!(
                    url = %article.url,
                    attempts = article.processing_attempts,
                    error = %e,
                    "analysis failed, retry ceiling reached"
                );
            } else {
                tracing::warn!(
                    url = %article.url,
                    attempts = article.processing_attempts,
                    error = %e,
                    "analysis failed, will retry"
                );
            }
            false
        }
    };

    let url = article.url.clone();
    if let Err(e) = store.put(article).await {
        // The write-back is what releases the claim; drop it explicitly so
        // the item does not stay shielded until the TTL lapses.
        let _ = store.release_claim(&url).await;
        return Err(e);
    }
    Ok(write_back)
}
