//! News aggregation handler.

use axum::{
    extract::{rejection::QueryRejection, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;

use crate::web::dto::{NewsQuery, NewsResponse};
use crate::web::handlers::AppState;

/// GET /api/news - Aggregate, rank and deduplicate articles.
///
/// The pipeline runs in its own task; if it fails unexpectedly the client
/// gets an empty list and a generic error marker.
pub async fn get_news(
    State(state): State<Arc<AppState>>,
    query: Result<Query<NewsQuery>, QueryRejection>,
) -> Response {
    let query = match query {
        Ok(Query(query)) => query,
        Err(e) => {
            tracing::debug!(error = %e, "Unreadable query string, using defaults");
            NewsQuery::default()
        }
    };
    let options = query.into_options(state.default_threshold);
    let debug = options.debug;
    let aggregator = state.aggregator.clone();

    let pipeline = tokio::spawn(async move { aggregator.aggregate(&options).await });

    match pipeline.await {
        Ok(aggregation) => Json(NewsResponse::from_aggregation(aggregation, debug)).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "News pipeline failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(NewsResponse::internal_error()),
            )
                .into_response()
        }
    }
}
