//! Taleweave — read-only HTTP query surface.
//!
//! Serves the graph/history interface over the tree store: game list,
//! branch and tag lists, and ancestor-path histories. Mutations go
//! through the engine crate's command methods, not HTTP.

pub mod error;
pub mod routes;
pub mod state;
