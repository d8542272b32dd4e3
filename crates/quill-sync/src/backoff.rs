//! Retry backoff policy.

use std::time::Duration;

/// Exponential backoff with symmetric jitter.
///
/// The delay for attempt `n` is `base * factor^(n-1)`, capped at
/// `max_delay`, then spread by `± jitter` (a fraction of the delay) to keep
/// concurrent clients from retrying in lockstep.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub factor: u32,
    pub max_delay: Duration,
    pub jitter: f64,
    pub max_attempts: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(500),
            factor: 2,
            max_delay: Duration::from_secs(30),
            jitter: 0.25,
            max_attempts: 5,
        }
    }
}

impl BackoffPolicy {
    /// Jitter-free policy, used where deterministic timing matters.
    pub fn fixed(base: Duration, max_attempts: u32) -> Self {
        Self {
            base,
            jitter: 0.0,
            max_attempts,
            ..Self::default()
        }
    }

    /// Delay before the given 1-based attempt.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let scaled = self
            .base
            .saturating_mul(self.factor.saturating_pow(exponent))
            .min(self.max_delay);

        if self.jitter <= 0.0 {
            return scaled.max(Duration::from_millis(1));
        }

        let spread = self.jitter.min(1.0);
        let factor = 1.0 + spread * (rand::random::<f64>() * 2.0 - 1.0);
        let millis = (scaled.as_millis() as f64 * factor).max(1.0);
        Duration::from_millis(millis as u64)
    }
}
