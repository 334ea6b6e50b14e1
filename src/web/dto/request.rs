//! Request DTOs for Web API.

use serde::Deserialize;

use crate::aggregator::AggregateOptions;

/// Query parameters of `GET /api/news`.
///
/// Every field is kept as a raw string; [`NewsQuery::into_options`] decides
/// what an odd value means, so a malformed parameter never fails the request.
#[derive(Debug, Default, Deserialize)]
pub struct NewsQuery {
    /// Comma-separated source ids.
    pub sources: Option<String>,
    /// Keyword filter.
    pub q: Option<String>,
    /// Dedupe base threshold.
    pub sim: Option<String>,
    /// Image enrichment switch.
    pub og: Option<String>,
    /// Dedupe switch.
    pub dedupe: Option<String>,
    /// `1` adds stats and counts to the response.
    pub debug: Option<String>,
}

impl NewsQuery {
    /// Resolve the raw parameters into pipeline options.
    pub fn into_options(self, default_threshold: f64) -> AggregateOptions {
        AggregateOptions {
            sources: parse_sources(self.sources.as_deref()),
            query: self
                .q
                .map(|q| q.trim().to_lowercase())
                .filter(|q| !q.is_empty()),
            threshold: parse_threshold(self.sim.as_deref()).unwrap_or(default_threshold),
            enrich_images: parse_og(self.og.as_deref()),
            dedupe: !self
                .dedupe
                .as_deref()
                .map(|v| matches!(v.trim().to_lowercase().as_str(), "off" | "0" | "false"))
                .unwrap_or(false),
            debug: self.debug.as_deref() == Some("1"),
        }
    }
}

fn parse_sources(raw: Option<&str>) -> Option<Vec<String>> {
    let ids: Vec<String> = raw?
        .split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .collect();
    (!ids.is_empty()).then_some(ids)
}

fn parse_threshold(raw: Option<&str>) -> Option<f64> {
    raw?.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && (0.0..=1.0).contains(v))
}

fn parse_og(raw: Option<&str>) -> bool {
    match raw {
        None => true,
        Some(v) => matches!(v.trim().to_lowercase().as_str(), "" | "1" | "on"),
    }
}
