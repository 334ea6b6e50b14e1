//! Source listing handler.

use axum::{extract::State, Json};
use std::sync::Arc;

use crate::web::dto::SourcesResponse;
use crate::web::handlers::AppState;

/// GET /api/sources - List the configured sources in registry order.
pub async fn list_sources(State(state): State<Arc<AppState>>) -> Json<SourcesResponse> {
    Json(SourcesResponse {
        sources: state.aggregator.registry().all().to_vec(),
    })
}
