// tests/enrich_pipeline.rs
//! Enricher state machine: success fills every enrichment field, failures
//! drive the retry ceiling, and claims keep concurrent runs off the same
//! article.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};

use news_prism::analyze::ai_adapter::{AnalysisError, AnalysisResult, Analyst, MockAnalyst};
use news_prism::article::{Article, DetailedSummary, ProcessingStatus};
use news_prism::bias::BiasLabel;
use news_prism::enrich::{EnrichConfig, Enricher};
use news_prism::store::{ArticleStore, MemoryStore};

fn pending_article(url: &str, minutes_ago: i64, prior: Option<BiasLabel>) -> Article {
    Article::stub(
        url,
        "Headline",
        "Raw body text",
        "Politics",
        prior,
        Utc::now() - ChronoDuration::minutes(minutes_ago),
        ChronoDuration::days(7),
    )
}

struct FailingAnalyst;

#[async_trait]
impl Analyst for FailingAnalyst {
    async fn analyze(&self, _raw_content: &str) -> Result<AnalysisResult, AnalysisError> {
        Err(AnalysisError::Upstream("synthetic failure".into()))
    }
    fn provider_name(&self) -> &'static str {
        "failing"
    }
}

/// Counts invocations and holds each one open long enough for a second
/// run to overlap.
struct SlowCountingAnalyst {
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl Analyst for SlowCountingAnalyst {
    async fn analyze(&self, _raw_content: &str) -> Result<AnalysisResult, AnalysisError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        Ok(AnalysisResult {
            tldr: "Counted.".into(),
            sections: DetailedSummary {
                what_happened: "X".into(),
                impact: "Y".into(),
                conclusion: "Z".into(),
            },
            topic_tags: vec![],
            keywords: vec![],
            content_bias: None,
        })
    }
    fn provider_name(&self) -> &'static str {
        "slow-counting"
    }
}

#[tokio::test]
async fn successful_analysis_fills_all_enrichment_fields() {
    let store = Arc::new(MemoryStore::new());
    store
        .put(pending_article(
            "https://a.test/1",
            5,
            Some(BiasLabel::LeanRight),
        ))
        .await
        .unwrap();

    let enricher = Enricher::new(
        Arc::clone(&store) as _,
        Arc::new(MockAnalyst::canned()),
        EnrichConfig::default(),
    );
    let report = enricher.process_queue(10).await.unwrap();
    assert_eq!(report.succeeded, 1);
    assert_eq!(report.failed, 0);

    let article = store.get("https://a.test/1").await.unwrap().unwrap();
    assert_eq!(article.processing_status, ProcessingStatus::Analyzed);
    assert!(article.tldr_summary.is_some());
    assert!(article.detailed_summary.is_some());
    assert!(article.bias_label.is_some());
    assert!(article.topic_tags.contains("Politics"));
}

#[tokio::test]
async fn oldest_pending_is_selected_first() {
    let store = Arc::new(MemoryStore::new());
    store
        .put(pending_article("https://a.test/newer", 1, None))
        .await
        .unwrap();
    store
        .put(pending_article("https://a.test/older", 120, None))
        .await
        .unwrap();

    let enricher = Enricher::new(
        Arc::clone(&store) as _,
        Arc::new(MockAnalyst::canned()),
        EnrichConfig::default(),
    );
    // Batch of one must pick the oldest stub.
    enricher.process_queue(1).await.unwrap();

    let older = store.get("https://a.test/older").await.unwrap().unwrap();
    let newer = store.get("https://a.test/newer").await.unwrap().unwrap();
    assert_eq!(older.processing_status, ProcessingStatus::Analyzed);
    assert_eq!(newer.processing_status, ProcessingStatus::Pending);
}

#[tokio::test]
async fn failures_retry_until_the_ceiling_then_mark_failed() {
    let store = Arc::new(MemoryStore::new());
    store
        .put(pending_article("https://a.test/1", 5, None))
        .await
        .unwrap();

    let enricher = Enricher::new(
        Arc::clone(&store) as _,
        Arc::new(FailingAnalyst),
        EnrichConfig {
            retry_ceiling: 3,
            ..Default::default()
        },
    );

    for expected_attempts in 1..=2u32 {
        let report = enricher.process_queue(10).await.unwrap();
        assert_eq!(report.failed, 1);
        let article = store.get("https://a.test/1").await.unwrap().unwrap();
        assert_eq!(article.processing_attempts, expected_attempts);
        assert_eq!(
            article.processing_status,
            ProcessingStatus::Pending,
            "below the ceiling the item stays pending"
        );
    }

    let report = enricher.process_queue(10).await.unwrap();
    assert_eq!(report.failed, 1);
    let article = store.get("https://a.test/1").await.unwrap().unwrap();
    assert_eq!(article.processing_attempts, 3);
    assert_eq!(article.processing_status, ProcessingStatus::Failed);

    // A failed item is no longer selectable.
    let report = enricher.process_queue(10).await.unwrap();
    assert_eq!(report.succeeded + report.failed, 0);
}

#[tokio::test]
async fn one_bad_item_does_not_abort_the_batch() {
    let store = Arc::new(MemoryStore::new());
    store
        .put(pending_article("https://a.test/ok", 10, None))
        .await
        .unwrap();
    store
        .put(pending_article("https://a.test/bad", 5, None))
        .await
        .unwrap();

    // Analyst fails only for the "bad" article.
    struct Selective;
    #[async_trait]
    impl Analyst for Selective {
        async fn analyze(&self, raw_content: &str) -> Result<AnalysisResult, AnalysisError> {
            if raw_content.contains("bad-marker") {
                return Err(AnalysisError::Timeout);
            }
            MockAnalyst::canned().analyze(raw_content).await
        }
        fn provider_name(&self) -> &'static str {
            "selective"
        }
    }
    let mut bad = store.get("https://a.test/bad").await.unwrap().unwrap();
    bad.raw_content = "bad-marker".into();
    store.put(bad).await.unwrap();

    let enricher = Enricher::new(
        Arc::clone(&store) as _,
        Arc::new(Selective),
        EnrichConfig::default(),
    );
    let report = enricher.process_queue(10).await.unwrap();
    assert_eq!(report.succeeded, 1);
    assert_eq!(report.failed, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_runs_never_double_analyze_one_url() {
    let store = Arc::new(MemoryStore::new());
    store
        .put(pending_article("https://a.test/1", 5, None))
        .await
        .unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let enricher = Arc::new(Enricher::new(
        Arc::clone(&store) as _,
        Arc::new(SlowCountingAnalyst {
            calls: Arc::clone(&calls),
        }),
        EnrichConfig::default(),
    ));

    let a = Arc::clone(&enricher);
    let b = Arc::clone(&enricher);
    let (ra, rb) = tokio::join!(a.process_queue(10), b.process_queue(10));
    let (ra, rb) = (ra.unwrap(), rb.unwrap());

    assert_eq!(calls.load(Ordering::SeqCst), 1, "claimed once, analyzed once");
    assert_eq!(ra.succeeded + rb.succeeded, 1);

    let article = store.get("https://a.test/1").await.unwrap().unwrap();
    assert_eq!(article.processing_status, ProcessingStatus::Analyzed);
}
