//! Retry policy for the generation capability.

use std::time::Duration;

/// Bounded retry with exponential backoff.
///
/// The delay doubles after each failed attempt, capped at `max_delay`.
/// Each attempt is also bounded by `attempt_timeout`; a timed-out
/// attempt counts as a retryable failure.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub initial_delay: Duration,
    /// Ceiling for the doubling delay.
    pub max_delay: Duration,
    /// Time budget for a single generation attempt.
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
            attempt_timeout: Duration::from_secs(120),
        }
    }
}

impl RetryPolicy {
    /// Backoff delay after the given failed attempt (1-indexed):
    /// `min(initial * 2^(attempt-1), max)`.
    #[must_use]
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 2_u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_delay.saturating_mul(factor).min(self.max_delay)
    }
}
