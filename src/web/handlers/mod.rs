//! API handlers.

pub mod news;
pub mod sources;

use std::sync::Arc;

use crate::aggregator::Aggregator;
use crate::web::error::ApiError;

pub use news::get_news;
pub use sources::list_sources;

/// Shared state of the API handlers.
pub struct AppState {
    /// The aggregation pipeline.
    pub aggregator: Arc<Aggregator>,
    /// Dedupe threshold used when a request gives none.
    pub default_threshold: f64,
}

impl AppState {
    /// Create a new application state.
    pub fn new(aggregator: Arc<Aggregator>, default_threshold: f64) -> Self {
        Self {
            aggregator,
            default_threshold,
        }
    }
}

/// Fallback for unknown routes.
pub async fn not_found() -> ApiError {
    ApiError::not_found("No such endpoint")
}
