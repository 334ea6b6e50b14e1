//! Response DTOs for Web API.

use serde::Serialize;

use crate::aggregator::{Aggregation, Counts};
use crate::feed::{Article, FetchStat, SourceDescriptor};

/// Body of `GET /api/news`.
#[derive(Debug, Serialize)]
pub struct NewsResponse {
    /// Ranked, filtered and deduplicated articles.
    pub articles: Vec<Article>,
    /// Per-source outcomes (debug mode only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<Vec<FetchStat>>,
    /// Pipeline counters (debug mode only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub counts: Option<Counts>,
    /// Generic failure marker; never carries internal detail.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<&'static str>,
}

impl NewsResponse {
    /// Build the response for a finished aggregation.
    pub fn from_aggregation(aggregation: Aggregation, debug: bool) -> Self {
        let (stats, counts) = if debug {
            (Some(aggregation.stats), Some(aggregation.counts))
        } else {
            (None, None)
        };
        Self {
            articles: aggregation.articles,
            stats,
            counts,
            error: None,
        }
    }

    /// Body sent when the pipeline itself failed.
    pub fn internal_error() -> Self {
        Self {
            articles: Vec::new(),
            stats: None,
            counts: None,
            error: Some("internal"),
        }
    }
}

/// Body of `GET /api/sources`.
#[derive(Debug, Serialize)]
pub struct SourcesResponse {
    pub sources: Vec<SourceDescriptor>,
}
