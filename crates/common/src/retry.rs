//! Retry strategy with exponential backoff and jitter.
//!
//! The job executor does not sleep between attempts; it computes a
//! `next_attempt_at` timestamp from [`RetryStrategy::delay_for`] and persists
//! it, so a restart never loses backoff state. The HTTP client uses the same
//! strategy inline for short transport-level retries.

use std::time::Duration;

use rand::Rng;

const DEFAULT_MAX_ATTEMPTS: u32 = 5;
const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(2);
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(300);
const DEFAULT_JITTER_FACTOR: f64 = 0.2;

/// Exponential backoff configuration.
#[derive(Debug, Clone)]
pub struct RetryStrategy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    jitter_factor: f64,
}

impl Default for RetryStrategy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            jitter_factor: DEFAULT_JITTER_FACTOR,
        }
    }
}

impl RetryStrategy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Jitter factor in `[0.0, 1.0]`; the computed delay is scaled by a
    /// random value in `[1 - factor, 1 + factor]`.
    pub fn with_jitter_factor(mut self, factor: f64) -> Self {
        self.jitter_factor = factor.clamp(0.0, 1.0);
        self
    }

    /// Total attempts allowed (initial try included).
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Whether another attempt is allowed after `attempts` tries.
    pub fn allows_retry(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }

    /// Backoff delay before attempt number `attempt` (1-based: the delay
    /// after the first failure is `delay_for(1)`), capped and jittered.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(16);
        let multiplier = 1u64 << shift;
        let raw = self.base_delay.saturating_mul(multiplier as u32).min(self.max_delay);

        if self.jitter_factor <= f64::EPSILON {
            return raw;
        }

        let jitter: f64 = rand::thread_rng().gen_range(-self.jitter_factor..=self.jitter_factor);
        let scaled = raw.as_secs_f64() * (1.0 + jitter);
        Duration::from_secs_f64(scaled.max(0.0)).min(self.max_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_jitter() -> RetryStrategy {
        RetryStrategy::new()
            .with_base_delay(Duration::from_secs(2))
            .with_max_delay(Duration::from_secs(300))
            .with_jitter_factor(0.0)
    }

    #[test]
    fn delay_grows_exponentially() {
        let strategy = no_jitter();
        assert_eq!(strategy.delay_for(1), Duration::from_secs(2));
        assert_eq!(strategy.delay_for(2), Duration::from_secs(4));
        assert_eq!(strategy.delay_for(3), Duration::from_secs(8));
    }

    #[test]
    fn delay_is_capped() {
        let strategy = no_jitter();
        assert_eq!(strategy.delay_for(12), Duration::from_secs(300));
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let strategy = RetryStrategy::new()
            .with_base_delay(Duration::from_secs(10))
            .with_jitter_factor(0.5);

        for _ in 0..100 {
            let delay = strategy.delay_for(1);
            assert!(delay >= Duration::from_secs(5));
            assert!(delay <= Duration::from_secs(15));
        }
    }

    #[test]
    fn attempt_ceiling() {
        let strategy = RetryStrategy::new().with_max_attempts(3);
        assert!(strategy.allows_retry(2));
        assert!(!strategy.allows_retry(3));
    }
}
