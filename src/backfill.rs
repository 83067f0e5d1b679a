//! # Backfill controller
//!
//! The designed recovery path for a stuck backlog. Items that exhausted
//! the enricher's automatic retries sit in `failed` until an operator (or
//! a schedule) triggers a backfill, which force-requeues them with a
//! fresh attempt budget. Stale `pending` items are already queued, so
//! they are only surfaced, never mutated; that is what keeps the
//! operation idempotent.

use std::sync::Arc;

use chrono::{Duration, Utc};
use metrics::{counter, describe_counter, describe_gauge, gauge};
use once_cell::sync::OnceCell;

use crate::article::ProcessingStatus;
use crate::store::{ArticleQuery, ArticleStore, QueryOrder, StoreError};

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "backfill_requeued_total",
            "Failed articles force-requeued to pending."
        );
        describe_gauge!(
            "backfill_stale_pending",
            "Pending articles older than the backfill cutoff at last scan."
        );
    });
}

pub struct BackfillController {
    store: Arc<dyn ArticleStore>,
}

impl BackfillController {
    pub fn new(store: Arc<dyn ArticleStore>) -> Self {
        Self { store }
    }

    /// Requeue `failed` articles older than `older_than`: attempts reset
    /// to zero, status forced back to `pending`, overriding the retry
    /// ceiling. Returns the number requeued. Running twice in a row with
    /// no intervening enrichment requeues nothing the second time.
    pub async fn backfill(&self, older_than: Duration) -> Result<usize, StoreError> {
        ensure_metrics_described();
        let cutoff = Utc::now() - older_than;

        let stale_pending = self
            .store
            .query(&ArticleQuery {
                status: Some(ProcessingStatus::Pending),
                created_before: Some(cutoff),
                order: QueryOrder::CreatedAsc,
                ..Default::default()
            })
            .await?;
        gauge!("backfill_stale_pending").set(stale_pending.len() as f64);
        if !stale_pending.is_empty() {
            tracing::info!(
                count = stale_pending.len(),
                %cutoff,
                "stale pending articles still awaiting enrichment"
            );
        }

        let failed = self
            .store
            .query(&ArticleQuery {
                status: Some(ProcessingStatus::Failed),
                created_before: Some(cutoff),
                order: QueryOrder::CreatedAsc,
                ..Default::default()
            })
            .await?;

        let mut requeued = 0usize;
        for mut article in failed {
            article.processing_attempts = 0;
            article.processing_status = ProcessingStatus::Pending;
            self.store.put(article).await?;
            requeued += 1;
        }

        counter!("backfill_requeued_total").increment(requeued as u64);
        tracing::info!(requeued, %cutoff, "backfill run finished");
        Ok(requeued)
    }
}
