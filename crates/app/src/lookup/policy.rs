//! Timeout and retry policy for remote lookups.

use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LookupPolicy {
    /// Upper bound on a single attempt, including reading the body.
    pub timeout: Duration,

    /// Attempts made after the first one fails.
    pub max_retries: u32,

    pub backoff_base: Duration,
    pub backoff_max: Duration,
}

impl LookupPolicy {
    /// A single attempt with no retries.
    #[must_use]
    pub fn once(timeout: Duration) -> Self {
        Self {
            timeout,
            max_retries: 0,
            backoff_base: Duration::ZERO,
            backoff_max: Duration::ZERO,
        }
    }

    /// Exponential delay before retry number `attempt + 1`, capped at `backoff_max`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.backoff_base
            .checked_mul(2_u32.saturating_pow(attempt))
            .map_or(self.backoff_max, |delay| delay.min(self.backoff_max))
    }

    /// Request timeouts, throttling and server errors are worth another attempt.
    pub fn is_retryable_status(status: u16) -> bool {
        matches!(status, 408 | 429 | 500..=599)
    }
}

impl Default for LookupPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(3),
            max_retries: 2,
            backoff_base: Duration::from_millis(100),
            backoff_max: Duration::from_secs(2),
        }
    }
}
