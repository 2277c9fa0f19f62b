//! Taleweave API server entry point.

use std::error::Error;
use std::net::SocketAddr;
use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use taleweave_api::routes;
use taleweave_api::state::AppState;
use taleweave_tree_store::{SqliteTreeStore, connect, run_migrations};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // Initialize tracing subscriber.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting Taleweave API server");

    // Read configuration from environment.
    let database_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:taleweave.db".to_string());
    let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port: u16 = std::env::var("PORT")
        .unwrap_or_else(|_| "3000".to_string())
        .parse()
        .map_err(|e| format!("PORT must be a valid u16: {e}"))?;

    // Open the database and bring the schema up to date.
    let pool = connect(&database_url).await?;
    run_migrations(&pool).await?;

    let app_state = AppState::new(Arc::new(SqliteTreeStore::new(pool)));
    let app = routes::app(app_state);

    // Start server.
    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .map_err(|e| format!("invalid HOST:PORT combination: {e}"))?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app).await?;

    Ok(())
}
