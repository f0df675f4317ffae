//! Retry policy for archive operations.

use std::time::Duration;

/// How long to wait between failed attempts and when to give up.
///
/// The default never gives up and waits a fixed 5 seconds between attempts.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Delay after the first failure
    pub delay: Duration,
    /// Total attempts allowed per operation, `None` = unbounded
    pub max_attempts: Option<u32>,
    /// Multiplier applied to the delay after each failure, `None` = fixed delay
    pub backoff_factor: Option<f64>,
    /// Ceiling for the backed-off delay
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(5),
            max_attempts: None,
            backoff_factor: None,
            max_delay: Duration::from_secs(120),
        }
    }
}

impl RetryPolicy {
    /// Unbounded retries with a fixed delay.
    pub fn fixed(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    pub fn with_backoff(mut self, factor: f64, max_delay: Duration) -> Self {
        self.backoff_factor = Some(factor);
        self.max_delay = max_delay;
        self
    }

    /// Whether another attempt is allowed after `failures` failed ones.
    pub fn should_retry(&self, failures: u32) -> bool {
        self.max_attempts.map_or(true, |max| failures < max)
    }

    /// Delay to wait after the `failures`-th failure (1-based).
    pub fn delay_for(&self, failures: u32) -> Duration {
        match self.backoff_factor {
            None => self.delay,
            Some(factor) => {
                let exponent = failures.saturating_sub(1).min(64) as i32;
                let secs = self.delay.as_secs_f64() * factor.powi(exponent);
                if secs.is_finite() && secs < self.max_delay.as_secs_f64() {
                    Duration::from_secs_f64(secs)
                } else {
                    self.max_delay
                }
            }
        }
    }

    /// Sleep for the delay after the `failures`-th failure.
    pub async fn wait(&self, failures: u32) {
        let delay = self.delay_for(failures);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_unbounded_fixed() {
        let policy = RetryPolicy::default();
        assert!(policy.should_retry(1_000_000));
        assert_eq!(policy.delay_for(1), Duration::from_secs(5));
        assert_eq!(policy.delay_for(50), Duration::from_secs(5));
    }

    #[test]
    fn test_bounded_attempts() {
        let policy = RetryPolicy::fixed(Duration::ZERO).with_max_attempts(3);
        assert!(policy.should_retry(1));
        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));
    }

    #[test]
    fn test_exponential_backoff_with_ceiling() {
        let policy = RetryPolicy::fixed(Duration::from_secs(2))
            .with_backoff(2.0, Duration::from_secs(10));
        assert_eq!(policy.delay_for(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for(2), Duration::from_secs(4));
        assert_eq!(policy.delay_for(3), Duration::from_secs(8));
        assert_eq!(policy.delay_for(4), Duration::from_secs(10));
        assert_eq!(policy.delay_for(200), Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_zero_delay_does_not_sleep() {
        let policy = RetryPolicy::fixed(Duration::ZERO);
        let start = std::time::Instant::now();
        policy.wait(1).await;
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}
