// src/scheduler.rs
//! Optional background ticker: harvest + queue drain on a fixed interval.
//! The HTTP triggers stay authoritative; this only automates them.

use std::sync::Arc;

use metrics::counter;
use tokio::task::JoinHandle;

use crate::enrich::Enricher;
use crate::feeds::FeedRegistry;
use crate::ingest::Harvester;

#[derive(Clone, Copy, Debug)]
pub struct PipelineSchedulerCfg {
    pub interval_secs: u64,
    pub queue_batch: usize,
}

/// Spawn a lightweight scheduler that runs the full pipeline on a timer.
/// The registry is re-read every tick so config edits are picked up
/// without a restart.
pub fn spawn_pipeline_scheduler(
    harvester: Arc<Harvester>,
    enricher: Arc<Enricher>,
    cfg: PipelineSchedulerCfg,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(std::time::Duration::from_secs(cfg.interval_secs));
        loop {
            ticker.tick().await;

            let registry = match FeedRegistry::load_default() {
                Ok(r) => r,
                Err(e) => {
                    tracing::warn!(error = %e, "feed registry unavailable, skipping tick");
                    continue;
                }
            };

            match harvester.harvest(&registry).await {
                Ok(report) => {
                    tracing::info!(
                        target: "scheduler",
                        new = report.new_count,
                        duplicate = report.duplicate_count,
                        errors = report.error_count,
                        "scheduled harvest tick"
                    );
                }
                Err(e) => {
                    tracing::warn!(error = %e, "scheduled harvest failed, skipping tick");
                    continue;
                }
            }

            enricher.drain(cfg.queue_batch).await;
            counter!("pipeline_runs_total").increment(1);
        }
    })
}
