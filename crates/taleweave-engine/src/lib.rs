//! Taleweave — turn advancement engine.
//!
//! Orchestrates the voting protocol, the generation capability, and the
//! tree store into the commit/rollback/reset protocol: freeze, snapshot
//! the tip, tally, generate with bounded retries, then commit with an
//! optimistic tip check.

pub mod context;
pub mod engine;
pub mod freeze;
pub mod retry;

pub use engine::{GameStatus, NarrativeEngine};
pub use retry::RetryPolicy;
