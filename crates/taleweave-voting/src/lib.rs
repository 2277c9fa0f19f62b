//! Taleweave — voting engine.
//!
//! Decides the next player input for a game. Voters either back one of
//! seven preset options (`A`–`G`) or raise free-text proposals that run
//! their own approve/reject sub-elections. State is ephemeral and
//! in-memory; it never outlives the decision it belongs to.

pub mod board;
pub mod decision;

pub use board::VoteBoard;
pub use decision::{Decision, Outcome, OutcomeSource, PresetOption, Proposal};
