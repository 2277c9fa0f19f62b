//! Route handlers.

use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub mod branches;
pub mod games;
pub mod health;
pub mod rounds;

/// Assembles the full application router.
pub fn app(state: AppState) -> Router {
    // TODO: Replace CorsLayer::permissive() with restricted origins for production.
    Router::new()
        .merge(health::router())
        .nest("/api/v1/games", games::router())
        .nest("/api/v1/branches", branches::router())
        .nest("/api/v1/rounds", rounds::router())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
