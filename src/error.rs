//! Error types for Newsdesk.

use thiserror::Error;

/// Common error type for Newsdesk.
///
/// Fetch and enrichment failures never escape their narrowest boundary: the
/// feed fetcher turns them into a failed [`FetchStat`](crate::feed::FetchStat)
/// and the image resolver turns them into "no image". The variants exist so
/// that those boundaries can report what went wrong.
#[derive(Error, Debug)]
pub enum NewsdeskError {
    /// Timeout, abort, connection or HTTP status failure.
    #[error("network error: {0}")]
    Network(String),

    /// Response body does not look like an XML feed.
    #[error("not an XML feed: {0}")]
    ContentType(String),

    /// Feed could not be parsed, even after sanitization.
    #[error("parse error: {0}")]
    Parse(String),

    /// Article page fetch or scan failure during image enrichment.
    #[error("image fetch error: {0}")]
    ImageFetch(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Validation error for configuration or input values.
    #[error("validation error: {0}")]
    Validation(String),
}

/// Result type alias for Newsdesk operations.
pub type Result<T> = std::result::Result<T, NewsdeskError>;
