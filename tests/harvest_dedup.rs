// tests/harvest_dedup.rs
//! Harvest runs are idempotent over an unchanged feed, isolate per-feed
//! failures, and only ever write bare pending stubs.

use std::sync::Arc;

use news_prism::article::ProcessingStatus;
use news_prism::bias::BiasLabel;
use news_prism::feeds::{FeedRegistry, FeedSource};
use news_prism::ingest::rss::FixtureFetcher;
use news_prism::ingest::{HarvestConfig, Harvester};
use news_prism::store::{ArticleQuery, ArticleStore, MemoryStore};

fn feed_xml(items: &[(&str, &str)]) -> String {
    let now = chrono::Utc::now().to_rfc2822();
    let mut xml = String::from(
        "<?xml version=\"1.0\"?><rss version=\"2.0\"><channel><title>Test Feed</title>",
    );
    for (url, title) in items {
        xml.push_str(&format!(
            "<item><title>{title}</title><link>{url}</link>\
             <pubDate>{now}</pubDate><description>Body of {title}</description></item>"
        ));
    }
    xml.push_str("</channel></rss>");
    xml
}

fn single_feed_registry(feed_url: &str) -> FeedRegistry {
    FeedRegistry {
        feeds: vec![FeedSource {
            url: feed_url.to_string(),
            category: "Politics".to_string(),
            bias_prior: Some(BiasLabel::Center),
        }],
    }
}

#[tokio::test]
async fn harvest_twice_with_unchanged_feed_is_idempotent() {
    let store = Arc::new(MemoryStore::new());
    let xml = feed_xml(&[
        ("https://a.test/1", "First story"),
        ("https://a.test/2", "Second story"),
    ]);
    let fetcher = Arc::new(FixtureFetcher::new().with("https://a.test/rss", &xml));
    let harvester = Harvester::new(fetcher, Arc::clone(&store) as _, HarvestConfig::default());
    let registry = single_feed_registry("https://a.test/rss");

    let first = harvester.harvest(&registry).await.unwrap();
    assert_eq!(first.new_count, 2);
    assert_eq!(first.duplicate_count, 0);
    assert_eq!(first.error_count, 0);

    let second = harvester.harvest(&registry).await.unwrap();
    assert_eq!(second.new_count, 0);
    assert_eq!(second.duplicate_count, 2);
    assert_eq!(second.error_count, 0);
}

#[tokio::test]
async fn pending_stubs_carry_no_enrichment() {
    let store = Arc::new(MemoryStore::new());
    let xml = feed_xml(&[("https://a.test/1", "Story")]);
    let fetcher = Arc::new(FixtureFetcher::new().with("https://a.test/rss", &xml));
    let harvester = Harvester::new(fetcher, Arc::clone(&store) as _, HarvestConfig::default());

    harvester
        .harvest(&single_feed_registry("https://a.test/rss"))
        .await
        .unwrap();

    let article = store.get("https://a.test/1").await.unwrap().unwrap();
    assert_eq!(article.processing_status, ProcessingStatus::Pending);
    assert!(article.enrichment_is_empty());
    assert_eq!(article.source_feed_category, "Politics");
    assert_eq!(article.outlet_bias_prior, Some(BiasLabel::Center));
}

#[tokio::test]
async fn one_broken_feed_does_not_abort_the_run() {
    let store = Arc::new(MemoryStore::new());
    let xml = feed_xml(&[("https://a.test/1", "Story")]);
    // Only the first feed has a fixture; the second fails to fetch.
    let fetcher = Arc::new(FixtureFetcher::new().with("https://a.test/rss", &xml));
    let harvester = Harvester::new(fetcher, Arc::clone(&store) as _, HarvestConfig::default());
    let registry = FeedRegistry {
        feeds: vec![
            FeedSource {
                url: "https://a.test/rss".to_string(),
                category: "Politics".to_string(),
                bias_prior: None,
            },
            FeedSource {
                url: "https://down.test/rss".to_string(),
                category: "Sports".to_string(),
                bias_prior: None,
            },
        ],
    };

    let report = harvester.harvest(&registry).await.unwrap();
    assert_eq!(report.new_count, 1);
    assert_eq!(report.error_count, 1);
}

#[tokio::test]
async fn entries_outside_the_recency_window_are_skipped() {
    let store = Arc::new(MemoryStore::new());
    let stale = "<?xml version=\"1.0\"?><rss version=\"2.0\"><channel><title>t</title>\
        <item><title>Old story</title><link>https://a.test/old</link>\
        <pubDate>Mon, 06 Jan 2020 12:00:00 GMT</pubDate></item>\
        <item><title>Undated story</title><link>https://a.test/undated</link></item>\
        </channel></rss>";
    let fetcher = Arc::new(FixtureFetcher::new().with("https://a.test/rss", stale));
    let harvester = Harvester::new(fetcher, Arc::clone(&store) as _, HarvestConfig::default());

    let report = harvester
        .harvest(&single_feed_registry("https://a.test/rss"))
        .await
        .unwrap();
    assert_eq!(report.new_count, 0);
    assert_eq!(report.duplicate_count, 0);

    let all = store.query(&ArticleQuery::default()).await.unwrap();
    assert!(all.is_empty());
}

#[tokio::test]
async fn per_feed_cap_bounds_one_run() {
    let store = Arc::new(MemoryStore::new());
    let items: Vec<(String, String)> = (0..20)
        .map(|i| (format!("https://a.test/{i}"), format!("Story {i}")))
        .collect();
    let borrowed: Vec<(&str, &str)> = items
        .iter()
        .map(|(u, t)| (u.as_str(), t.as_str()))
        .collect();
    let xml = feed_xml(&borrowed);
    let fetcher = Arc::new(FixtureFetcher::new().with("https://a.test/rss", &xml));
    let cfg = HarvestConfig {
        max_per_feed: 5,
        ..Default::default()
    };
    let harvester = Harvester::new(fetcher, Arc::clone(&store) as _, cfg);

    let report = harvester
        .harvest(&single_feed_registry("https://a.test/rss"))
        .await
        .unwrap();
    assert_eq!(report.new_count, 5);
}
