//! # Article model
//!
//! The pipeline's single persisted entity. An article is keyed by its
//! source URL, created as a bare stub by the harvester, and filled in
//! exactly once per successful analysis by the enricher. All enrichment
//! fields stay empty while the status is `pending`.

use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::analyze::ai_adapter::AnalysisResult;
use crate::bias::BiasLabel;

/// Placeholder for a detailed-summary section the analysis did not return.
pub const SECTION_PLACEHOLDER: &str = "Not available.";

/// Lifecycle state of an article.
/// Transitions: pending → analyzed, pending → failed, failed → pending
/// (backfill requeue only).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingStatus {
    Pending,
    Analyzed,
    Failed,
}

/// Structured summary with the three fixed sections. Sections missing from
/// the analysis output are filled with [`SECTION_PLACEHOLDER`], never
/// silently dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetailedSummary {
    pub what_happened: String,
    pub impact: String,
    pub conclusion: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    /// Natural key. Never mutated after creation.
    pub url: String,
    pub headline: String,
    pub raw_content: String,
    pub source_feed_category: String,
    /// Snapshot of the source feed's configured bias prior, stamped at
    /// ingestion time. Configuration data, not an enrichment field.
    pub outlet_bias_prior: Option<BiasLabel>,
    /// Ingestion timestamp; the sole basis for date bucketing. Immutable.
    pub created_at: DateTime<Utc>,
    /// Retention horizon; the store purges past it, the core never does.
    pub expire_at: DateTime<Utc>,
    pub processing_status: ProcessingStatus,
    pub processing_attempts: u32,
    pub tldr_summary: Option<String>,
    pub detailed_summary: Option<DetailedSummary>,
    pub bias_label: Option<BiasLabel>,
    pub topic_tags: BTreeSet<String>,
    pub keywords: BTreeSet<String>,
}

impl Article {
    /// New pending stub, as written by the harvester.
    pub fn stub(
        url: impl Into<String>,
        headline: impl Into<String>,
        raw_content: impl Into<String>,
        category: impl Into<String>,
        outlet_bias_prior: Option<BiasLabel>,
        now: DateTime<Utc>,
        retention: Duration,
    ) -> Self {
        Self {
            url: url.into(),
            headline: headline.into(),
            raw_content: raw_content.into(),
            source_feed_category: category.into(),
            outlet_bias_prior,
            created_at: now,
            expire_at: now + retention,
            processing_status: ProcessingStatus::Pending,
            processing_attempts: 0,
            tldr_summary: None,
            detailed_summary: None,
            bias_label: None,
            topic_tags: BTreeSet::new(),
            keywords: BTreeSet::new(),
        }
    }

    /// Hostname of the article URL, used by the similarity matcher to rule
    /// out same-outlet coverage.
    pub fn hostname(&self) -> Option<String> {
        url::Url::parse(&self.url)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.to_ascii_lowercase()))
    }

    /// Merge a successful analysis plus the final bias verdict, moving the
    /// article to `analyzed`. The source feed category joins the topic tags
    /// here so that pending stubs stay bare.
    pub fn apply_analysis(&mut self, analysis: AnalysisResult, bias: BiasLabel) {
        self.tldr_summary = Some(analysis.tldr);
        self.detailed_summary = Some(analysis.sections);
        self.bias_label = Some(bias);
        self.topic_tags = analysis.topic_tags.into_iter().collect();
        self.topic_tags.insert(self.source_feed_category.clone());
        self.keywords = analysis.keywords.into_iter().collect();
        self.processing_status = ProcessingStatus::Analyzed;
    }

    /// Count of topic tags and keywords shared with another article.
    pub fn overlap_with(&self, other: &Article) -> usize {
        self.topic_tags.intersection(&other.topic_tags).count()
            + self.keywords.intersection(&other.keywords).count()
    }

    /// True while no enrichment field has been written.
    pub fn enrichment_is_empty(&self) -> bool {
        self.tldr_summary.is_none()
            && self.detailed_summary.is_none()
            && self.bias_label.is_none()
            && self.topic_tags.is_empty()
            && self.keywords.is_empty()
    }
}
