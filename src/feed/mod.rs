//! Feed sources, fetching and normalization.

mod fetcher;
mod registry;
mod types;

pub use fetcher::{looks_like_xml, normalize_feed, parse_feed_lenient, sanitize_xml, strip_html, FeedFetcher};
pub use registry::{default_sources, SourceRegistry};
pub use types::{
    sort_by_recency, Article, FetchStat, SourceDescriptor, MAX_DESCRIPTION_LENGTH, UNTITLED,
};
