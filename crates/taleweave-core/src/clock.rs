//! Clock abstraction for determinism.

use chrono::{DateTime, Utc};

/// Source of the timestamps stamped onto rounds, branches, and tags.
///
/// Kept behind a trait so tests can pin time and assert on stored
/// `created_at` values.
pub trait Clock: Send + Sync {
    /// Returns the current time.
    fn now(&self) -> DateTime<Utc>;
}

/// Production clock backed by the system time.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
