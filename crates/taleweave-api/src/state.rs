//! Shared application state.

use std::sync::Arc;

use taleweave_core::store::TreeStore;

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// The tree store behind every query endpoint.
    pub store: Arc<dyn TreeStore>,
}

impl AppState {
    /// Create new application state.
    #[must_use]
    pub fn new(store: Arc<dyn TreeStore>) -> Self {
        Self { store }
    }
}
