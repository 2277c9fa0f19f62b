//! Shared test mocks and utilities for the Taleweave narrative engine.

mod clock;
mod generator;
mod store;

pub use clock::FixedClock;
pub use generator::{FailingGenerator, GeneratorCall, ScriptedGenerator};
pub use store::MemoryTreeStore;
