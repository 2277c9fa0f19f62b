//! Taleweave Core — shared domain abstractions.
//!
//! This crate defines the fundamental traits and types that the storage,
//! voting, engine, and API crates depend on. It contains no infrastructure
//! code.

pub mod clock;
pub mod error;
pub mod generator;
pub mod store;
