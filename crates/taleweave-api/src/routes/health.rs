//! Health check endpoint.

use axum::{Json, Router, routing::get};
use serde::Serialize;

use crate::state::AppState;

/// Liveness report for the query server.
#[derive(Serialize)]
pub struct HealthResponse {
    /// Always `"ok"` when the server is able to respond.
    pub status: String,
    /// Version of the running taleweave-api binary.
    pub version: String,
}

/// GET /health
///
/// Answers without touching the tree store; reachability only.
async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_owned(),
        version: env!("CARGO_PKG_VERSION").to_owned(),
    })
}

/// Returns the health check router.
pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
