//! Retry delay for failed bus API calls

use std::time::Duration;

/// Exponential backoff doubling from `base` up to 64x, reset on success
#[derive(Debug, Clone)]
pub(crate) struct Backoff {
    base: Duration,
    max: Duration,
    attempt: u32,
}

impl Backoff {
    pub(crate) fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            attempt: 0,
        }
    }

    /// Delay before the next retry
    pub(crate) fn next_delay(&mut self) -> Duration {
        let delay = self.base.saturating_mul(1 << self.attempt.min(6)); // cap at 64x
        self.attempt = self.attempt.saturating_add(1);
        delay.min(self.max)
    }

    pub(crate) fn reset(&mut self) {
        self.attempt = 0;
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Duration::from_millis(100), Duration::from_secs(10))
    }
}
