//! Exponential backoff between eligibility re-checks.

use std::time::Duration;

/// Delay schedule: attempt 0 waits `base`, attempt `n` waits
/// `base * 2^(n-1)`. Arithmetic saturates instead of overflowing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    /// Wait before the first re-check.
    pub base: Duration,
    /// Optional upper bound on any single wait.
    pub max_delay: Option<Duration>,
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Duration::from_millis(1000))
    }
}

impl Backoff {
    pub fn new(base: Duration) -> Self {
        Self {
            base,
            max_delay: None,
        }
    }

    /// Caps every delay at `max_delay`.
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = Some(max_delay);
        self
    }

    /// The wait before re-check number `attempt + 1`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let delay = if attempt == 0 {
            self.base
        } else {
            let exponent = (attempt - 1).min(63);
            let multiplier = 1u64 << exponent;
            let base_millis = u64::try_from(self.base.as_millis()).unwrap_or(u64::MAX);
            Duration::from_millis(base_millis.saturating_mul(multiplier))
        };

        match self.max_delay {
            Some(cap) => delay.min(cap),
            None => delay,
        }
    }
}
