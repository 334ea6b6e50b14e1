//! HTTP API for Newsdesk.
//!
//! `GET /api/news` runs the aggregation pipeline, `GET /api/sources` lists
//! the configured feeds and `GET /health` answers liveness probes.

pub mod dto;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod router;
pub mod server;

pub use error::ApiError;
pub use router::{create_health_router, create_router};
pub use server::WebServer;
