//! # Query layer
//!
//! Read-side operations over stored article records: date-bucketed feed,
//! available dates, and structured search. Thin by design: the natural
//! language front end is a black box behind [`TranslateQuery`]; the core
//! only executes the structured query it produces.

use async_trait::async_trait;
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::article::{Article, ProcessingStatus};
use crate::bias::BiasLabel;
use crate::store::{ArticleQuery, ArticleStore, QueryOrder, StoreError};

/// Default page size for the feed endpoint.
pub const FEED_LIMIT: usize = 50;
/// Default page size for search results.
pub const SEARCH_LIMIT: usize = 20;
/// How many recent records the available-dates scan inspects.
const DATE_SCAN_LIMIT: usize = 500;

/// Structured search filters, as produced by the query translator.
/// Unset/empty fields do not constrain the result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub topic_tags: Vec<String>,
    #[serde(default)]
    pub bias_label: Option<BiasLabel>,
}

impl SearchQuery {
    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty() && self.topic_tags.is_empty() && self.bias_label.is_none()
    }
}

/// Black-box natural-language-to-query translation contract.
#[async_trait]
pub trait TranslateQuery: Send + Sync {
    async fn translate(&self, query: &str) -> SearchQuery;
}

/// Fallback translator: treat the significant words of the query as
/// keywords. Used whenever no smarter front end is wired in.
pub struct KeywordTranslator;

#[async_trait]
impl TranslateQuery for KeywordTranslator {
    async fn translate(&self, query: &str) -> SearchQuery {
        let keywords = query
            .split_whitespace()
            .filter(|word| word.len() > 3)
            .map(|word| word.to_lowercase())
            .take(10)
            .collect();
        SearchQuery {
            keywords,
            ..Default::default()
        }
    }
}

/// Articles for one UTC calendar day (or the newest overall when no date
/// is given), newest first.
pub async fn feed_for_date(
    store: &dyn ArticleStore,
    date: Option<NaiveDate>,
    limit: usize,
) -> Result<Vec<Article>, StoreError> {
    let mut q = ArticleQuery {
        order: QueryOrder::CreatedDesc,
        limit: Some(limit),
        ..Default::default()
    };
    if let Some(day) = date {
        let start = day.and_hms_opt(0, 0, 0).expect("midnight").and_utc();
        q.created_after = Some(start);
        q.created_before = Some(start + Duration::days(1));
    }
    store.query(&q).await
}

/// Distinct `YYYY-MM-DD` days that have articles, newest first. Bounded
/// scan over the most recent records.
pub async fn available_dates(store: &dyn ArticleStore) -> Result<Vec<String>, StoreError> {
    let recent = store
        .query(&ArticleQuery {
            order: QueryOrder::CreatedDesc,
            limit: Some(DATE_SCAN_LIMIT),
            ..Default::default()
        })
        .await?;

    let mut dates: Vec<String> = Vec::new();
    for article in recent {
        let day = article.created_at.date_naive().to_string();
        // Input is newest-first, so repeats arrive adjacent.
        if dates.last() != Some(&day) {
            dates.push(day);
        }
    }
    Ok(dates)
}

/// Execute a structured search over analyzed articles, newest first.
pub async fn search(
    store: &dyn ArticleStore,
    query: &SearchQuery,
    limit: usize,
) -> Result<Vec<Article>, StoreError> {
    let analyzed = store
        .query(&ArticleQuery::with_status(ProcessingStatus::Analyzed))
        .await?;

    let wanted_tags: Vec<String> = query.topic_tags.iter().map(|t| t.to_lowercase()).collect();
    let wanted_keywords: Vec<String> = query.keywords.iter().map(|k| k.to_lowercase()).collect();

    let mut hits: Vec<Article> = analyzed
        .into_iter()
        .filter(|a| query.bias_label.map_or(true, |b| a.bias_label == Some(b)))
        .filter(|a| {
            wanted_tags.is_empty()
                || a.topic_tags
                    .iter()
                    .any(|t| wanted_tags.contains(&t.to_lowercase()))
        })
        .filter(|a| {
            wanted_keywords.is_empty() || {
                let headline = a.headline.to_lowercase();
                a.keywords
                    .iter()
                    .any(|k| wanted_keywords.contains(&k.to_lowercase()))
                    || wanted_keywords.iter().any(|k| headline.contains(k))
            }
        })
        .collect();
    hits.truncate(limit);
    Ok(hits)
}
