//! Newsdesk - RSS/Atom news aggregator.
//!
//! Fetches many feeds in parallel under a latency budget, ranks the merged
//! articles by recency, fills in missing images and collapses the same story
//! reported by several outlets. Served as JSON over HTTP.

pub mod aggregator;
pub mod cancel;
pub mod config;
pub mod dedupe;
pub mod error;
pub mod feed;
pub mod image;
pub mod logging;
pub mod net;
pub mod web;

pub use aggregator::{AggregateOptions, Aggregation, Aggregator, Counts, FetchBatch};
pub use cancel::{CancelHandle, CancelReason, CancelToken};
pub use config::Config;
pub use dedupe::dedupe_articles;
pub use error::{NewsdeskError, Result};
pub use feed::{Article, FeedFetcher, FetchStat, SourceDescriptor, SourceRegistry};
pub use image::ImageResolver;
pub use web::WebServer;
