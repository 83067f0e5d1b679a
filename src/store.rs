//! # Article store contract
//!
//! Persistence is an external collaborator; the pipeline only sees this
//! trait. Single-record writes keyed by URL, point read-after-write per
//! key, plus a claim mechanism that gives the enricher at-most-one
//! concurrent analysis per article.
//!
//! [`MemoryStore`] is the in-process implementation used by the service
//! binary and the tests. It also honors `expire_at` the way a managed
//! store's retention policy would: expired records vanish on read.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::article::{Article, ProcessingStatus};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("store serialization: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryOrder {
    CreatedAsc,
    CreatedDesc,
}

/// Filter for [`ArticleStore::query`]. Unset fields match everything.
#[derive(Debug, Clone)]
pub struct ArticleQuery {
    pub status: Option<ProcessingStatus>,
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
    pub order: QueryOrder,
    pub limit: Option<usize>,
}

impl Default for ArticleQuery {
    fn default() -> Self {
        Self {
            status: None,
            created_after: None,
            created_before: None,
            order: QueryOrder::CreatedDesc,
            limit: None,
        }
    }
}

impl ArticleQuery {
    pub fn with_status(status: ProcessingStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }
}

#[async_trait]
pub trait ArticleStore: Send + Sync {
    async fn get(&self, url: &str) -> Result<Option<Article>, StoreError>;

    async fn exists(&self, url: &str) -> Result<bool, StoreError>;

    /// Upsert by `article.url`. Completes (releases) any claim on the key.
    async fn put(&self, article: Article) -> Result<(), StoreError>;

    async fn query(&self, q: &ArticleQuery) -> Result<Vec<Article>, StoreError>;

    /// Atomically select up to `max` pending articles, oldest `created_at`
    /// first, skipping records already under an unexpired claim, and mark
    /// the returned ones claimed for `ttl`. The claim is the enricher's
    /// sole mutual-exclusion mechanism; an abandoned claim expires on its
    /// own, reverting the record to plain `pending`.
    async fn claim_pending(&self, max: usize, ttl: Duration) -> Result<Vec<Article>, StoreError>;

    /// Drop a claim without writing, e.g. when a run is cancelled.
    async fn release_claim(&self, url: &str) -> Result<(), StoreError>;
}

#[derive(Default)]
struct MemoryInner {
    articles: HashMap<String, Article>,
    claims: HashMap<String, Instant>,
}

/// In-memory store. All operations take one short-lived lock.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, MemoryInner>, StoreError> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Unavailable("store lock poisoned".into()))
    }

    fn purge_expired(inner: &mut MemoryInner, now: DateTime<Utc>) {
        inner.articles.retain(|_, a| a.expire_at > now);
    }
}

#[async_trait]
impl ArticleStore for MemoryStore {
    async fn get(&self, url: &str) -> Result<Option<Article>, StoreError> {
        let mut inner = self.lock()?;
        Self::purge_expired(&mut inner, Utc::now());
        Ok(inner.articles.get(url).cloned())
    }

    async fn exists(&self, url: &str) -> Result<bool, StoreError> {
        let mut inner = self.lock()?;
        Self::purge_expired(&mut inner, Utc::now());
        Ok(inner.articles.contains_key(url))
    }

    async fn put(&self, article: Article) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        inner.claims.remove(&article.url);
        inner.articles.insert(article.url.clone(), article);
        Ok(())
    }

    async fn query(&self, q: &ArticleQuery) -> Result<Vec<Article>, StoreError> {
        let mut inner = self.lock()?;
        Self::purge_expired(&mut inner, Utc::now());

        let mut hits: Vec<Article> = inner
            .articles
            .values()
            .filter(|a| q.status.map_or(true, |s| a.processing_status == s))
            .filter(|a| q.created_after.map_or(true, |t| a.created_at >= t))
            .filter(|a| q.created_before.map_or(true, |t| a.created_at < t))
            .cloned()
            .collect();

        // Secondary key on `url` keeps ordering stable across equal timestamps.
        match q.order {
            QueryOrder::CreatedAsc => {
                hits.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.url.cmp(&b.url)))
            }
            QueryOrder::CreatedDesc => {
                hits.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.url.cmp(&b.url)))
            }
        }
        if let Some(limit) = q.limit {
            hits.truncate(limit);
        }
        Ok(hits)
    }

    async fn claim_pending(&self, max: usize, ttl: Duration) -> Result<Vec<Article>, StoreError> {
        let mut inner = self.lock()?;
        let wall_now = Utc::now();
        Self::purge_expired(&mut inner, wall_now);

        let now = Instant::now();
        inner.claims.retain(|_, claimed_at| now.duration_since(*claimed_at) < ttl);

        let mut candidates: Vec<&Article> = inner
            .articles
            .values()
            .filter(|a| a.processing_status == ProcessingStatus::Pending)
            .filter(|a| !inner.claims.contains_key(&a.url))
            .collect();
        candidates.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.url.cmp(&b.url)));

        let batch: Vec<Article> = candidates.into_iter().take(max).cloned().collect();
        for article in &batch {
            inner.claims.insert(article.url.clone(), now);
        }
        Ok(batch)
    }

    async fn release_claim(&self, url: &str) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        inner.claims.remove(url);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bias::BiasLabel;
    use chrono::Duration as ChronoDuration;

    fn article(url: &str, minutes_ago: i64) -> Article {
        let now = Utc::now();
        Article::stub(
            url,
            "h",
            "body",
            "Politics",
            Some(BiasLabel::Center),
            now - ChronoDuration::minutes(minutes_ago),
            ChronoDuration::days(7),
        )
    }

    #[tokio::test]
    async fn put_then_get_roundtrips() {
        let store = MemoryStore::new();
        store.put(article("https://a.test/1", 0)).await.unwrap();
        assert!(store.exists("https://a.test/1").await.unwrap());
        let got = store.get("https://a.test/1").await.unwrap().unwrap();
        assert_eq!(got.url, "https://a.test/1");
    }

    #[tokio::test]
    async fn claim_is_fifo_and_exclusive() {
        let store = MemoryStore::new();
        store.put(article("https://a.test/new", 1)).await.unwrap();
        store.put(article("https://a.test/old", 60)).await.unwrap();

        let first = store
            .claim_pending(1, Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].url, "https://a.test/old");

        // The claimed record is invisible to a second claimer.
        let second = store
            .claim_pending(2, Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].url, "https://a.test/new");
    }

    #[tokio::test]
    async fn expired_claims_are_reissued() {
        let store = MemoryStore::new();
        store.put(article("https://a.test/1", 0)).await.unwrap();

        let first = store
            .claim_pending(1, Duration::from_millis(1))
            .await
            .unwrap();
        assert_eq!(first.len(), 1);
        tokio::time::sleep(Duration::from_millis(5)).await;

        let again = store
            .claim_pending(1, Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(again.len(), 1, "expired claim should be reissued");
    }

    #[tokio::test]
    async fn put_releases_claim() {
        let store = MemoryStore::new();
        store.put(article("https://a.test/1", 0)).await.unwrap();
        let mut batch = store
            .claim_pending(1, Duration::from_secs(60))
            .await
            .unwrap();
        let mut item = batch.pop().unwrap();
        item.processing_attempts = 1;
        store.put(item).await.unwrap();

        // Still pending, and claimable again after the write-back.
        let again = store
            .claim_pending(1, Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(again.len(), 1);
        assert_eq!(again[0].processing_attempts, 1);
    }

    #[tokio::test]
    async fn expired_articles_are_purged_on_read() {
        let store = MemoryStore::new();
        let mut a = article("https://a.test/1", 0);
        a.expire_at = Utc::now() - ChronoDuration::hours(1);
        store.put(a).await.unwrap();
        assert!(!store.exists("https://a.test/1").await.unwrap());
    }

    #[tokio::test]
    async fn query_filters_and_orders() {
        let store = MemoryStore::new();
        store.put(article("https://a.test/1", 10)).await.unwrap();
        store.put(article("https://a.test/2", 5)).await.unwrap();

        let q = ArticleQuery {
            status: Some(ProcessingStatus::Pending),
            order: QueryOrder::CreatedAsc,
            ..Default::default()
        };
        let hits = store.query(&q).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].url, "https://a.test/1");

        let q = ArticleQuery {
            status: Some(ProcessingStatus::Analyzed),
            ..Default::default()
        };
        assert!(store.query(&q).await.unwrap().is_empty());
    }
}
