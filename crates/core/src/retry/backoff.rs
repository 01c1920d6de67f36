//! Exponential backoff between retry dispatches.

use std::time::Duration;

use crate::config::RetryConfig;

/// `base * 2^(attempts - 1)`, capped at `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    base_ms: u64,
    max_ms: u64,
}

impl BackoffPolicy {
    /// A ceiling below the base is raised to the base.
    pub fn new(base_ms: u64, max_ms: u64) -> Self {
        Self {
            base_ms,
            max_ms: max_ms.max(base_ms),
        }
    }

    pub fn base(&self) -> Duration {
        Duration::from_millis(self.base_ms)
    }

    pub fn ceiling(&self) -> Duration {
        Duration::from_millis(self.max_ms)
    }

    /// Delay before re-dispatching a job that has already run `attempts` times.
    pub fn delay_for(&self, attempts: u32) -> Duration {
        let exponent = attempts.saturating_sub(1).min(63);
        let factor = 1u64.checked_shl(exponent).unwrap_or(u64::MAX);
        let ms = self.base_ms.saturating_mul(factor).min(self.max_ms);
        Duration::from_millis(ms)
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for BackoffPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self::new(config.backoff_base_ms, config.max_backoff_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_retry_uses_base() {
        let policy = BackoffPolicy::new(1000, 60_000);
        assert_eq!(policy.delay_for(1), Duration::from_millis(1000));
        assert_eq!(policy.delay_for(0), Duration::from_millis(1000));
    }

    #[test]
    fn test_delays_double_until_ceiling() {
        let policy = BackoffPolicy::new(1000, 60_000);
        let delays: Vec<u64> = (1..=10)
            .map(|n| policy.delay_for(n).as_millis() as u64)
            .collect();
        assert_eq!(
            delays,
            vec![1000, 2000, 4000, 8000, 16000, 32000, 60000, 60000, 60000, 60000]
        );
    }

    #[test]
    fn test_delays_strictly_increase_below_ceiling() {
        let policy = BackoffPolicy::new(250, 10_000);
        let mut previous = Duration::ZERO;
        for attempts in 1..=40 {
            let delay = policy.delay_for(attempts);
            if previous < policy.ceiling() {
                assert!(delay > previous, "attempt {} did not grow", attempts);
            } else {
                assert_eq!(delay, policy.ceiling());
            }
            previous = delay;
        }
    }

    #[test]
    fn test_huge_attempt_counts_saturate() {
        let policy = BackoffPolicy::new(u64::MAX / 2, u64::MAX);
        assert_eq!(policy.delay_for(u32::MAX), Duration::from_millis(u64::MAX));
    }

    #[test]
    fn test_ceiling_below_base_is_raised() {
        let policy = BackoffPolicy::new(500, 100);
        assert_eq!(policy.delay_for(3), Duration::from_millis(500));
    }

    #[test]
    fn test_from_config() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.base(), Duration::from_millis(1000));
        assert_eq!(policy.ceiling(), Duration::from_millis(60_000));
    }
}
