//! Taleweave — SQLite tree store.
//!
//! Persists the version-controlled story tree: append-only rounds,
//! movable branch tips, immovable tags, and the per-game freeze flag.
//! All compare-and-swap primitives the advancement protocol relies on
//! live here, implemented as single transactions.

pub mod pool;
pub mod store;

pub use pool::{connect, run_migrations};
pub use store::SqliteTreeStore;
