//! # Similarity matcher
//!
//! Cross-outlet discovery: given one analyzed article, find other
//! analyzed articles that look like coverage of the same event. Candidacy
//! is at least one shared topic tag or keyword; same-hostname articles
//! are excluded because the same outlet is not corroboration. Groups are
//! computed on demand and never stored.

use crate::article::{Article, ProcessingStatus};
use crate::store::{ArticleQuery, ArticleStore, StoreError};

/// Ordered similar-coverage lookup. Ranks by shared tag+keyword count,
/// freshest first among ties. An empty result is the normal outcome for
/// uncorroborated coverage, not an error.
pub async fn find_similar(
    store: &dyn ArticleStore,
    article: &Article,
) -> Result<Vec<Article>, StoreError> {
    let own_host = article.hostname();

    let analyzed = store
        .query(&ArticleQuery::with_status(ProcessingStatus::Analyzed))
        .await?;

    let mut ranked: Vec<(usize, Article)> = analyzed
        .into_iter()
        .filter(|candidate| candidate.url != article.url)
        .filter(|candidate| match (&own_host, candidate.hostname()) {
            (Some(own), Some(theirs)) => *own != theirs,
            _ => true,
        })
        .filter_map(|candidate| {
            let overlap = article.overlap_with(&candidate);
            (overlap > 0).then_some((overlap, candidate))
        })
        .collect();

    ranked.sort_by(|(overlap_a, a), (overlap_b, b)| {
        overlap_b
            .cmp(overlap_a)
            .then(b.created_at.cmp(&a.created_at))
            .then(a.url.cmp(&b.url))
    });

    Ok(ranked.into_iter().map(|(_, a)| a).collect())
}
