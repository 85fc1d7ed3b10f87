//! Retry timing for the upstream device
//!
//! The delay for attempt `n` is `first × factor^n`, clamped to `max`. With
//! `factor == 1.0` every retry waits `first`.

use std::time::Duration;

/// Delay between failed open attempts
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BackoffPolicy {
    /// Delay before the first retry
    pub first: Duration,
    /// Upper bound for any delay
    pub max: Duration,
    /// Growth per attempt
    pub factor: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::fixed(Duration::from_secs(5))
    }
}

impl BackoffPolicy {
    /// Constant delay
    pub fn fixed(delay: Duration) -> Self {
        Self {
            first: delay,
            max: delay,
            factor: 1.0,
        }
    }

    /// Exponential delay starting at `first`, capped at `max`
    pub fn exponential(first: Duration, max: Duration, factor: f64) -> Self {
        Self { first, max, factor }
    }

    /// Delay for the given attempt (0-indexed)
    pub fn next(&self, attempt: u32) -> Duration {
        let max_secs = self.max.as_secs_f64();
        let exp = attempt.min(i32::MAX as u32) as i32;
        let secs = self.first.as_secs_f64() * self.factor.powi(exp);

        if !secs.is_finite() || secs < 0.0 || secs > max_secs {
            self.max
        } else {
            Duration::from_secs_f64(secs)
        }
    }
}

/// How the line source recovers from a lost device
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ReconnectPolicy {
    /// Delay between failed open attempts
    pub open_backoff: BackoffPolicy,
    /// Pause after EOF or a read error before reopening
    pub reopen_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            open_backoff: BackoffPolicy::fixed(Duration::from_secs(5)),
            reopen_delay: Duration::from_secs(2),
        }
    }
}

impl ReconnectPolicy {
    /// Set the open retry backoff
    pub fn open_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.open_backoff = backoff;
        self
    }

    /// Set the pause before reopening
    pub fn reopen_delay(mut self, delay: Duration) -> Self {
        self.reopen_delay = delay;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_is_constant() {
        let policy = BackoffPolicy::fixed(Duration::from_secs(5));
        for attempt in 0..20 {
            assert_eq!(policy.next(attempt), Duration::from_secs(5));
        }
    }

    #[test]
    fn test_exponential_growth() {
        let policy = BackoffPolicy::exponential(
            Duration::from_millis(100),
            Duration::from_secs(30),
            2.0,
        );

        assert_eq!(policy.next(0), Duration::from_millis(100));
        assert_eq!(policy.next(1), Duration::from_millis(200));
        assert_eq!(policy.next(3), Duration::from_millis(800));
    }

    #[test]
    fn test_clamped_to_max() {
        let policy =
            BackoffPolicy::exponential(Duration::from_millis(100), Duration::from_secs(1), 2.0);

        assert_eq!(policy.next(10), Duration::from_secs(1));
        assert_eq!(policy.next(u32::MAX), Duration::from_secs(1));
    }

    #[test]
    fn test_reconnect_defaults() {
        let policy = ReconnectPolicy::default();

        assert_eq!(policy.open_backoff.next(0), Duration::from_secs(5));
        assert_eq!(policy.open_backoff.next(7), Duration::from_secs(5));
        assert_eq!(policy.reopen_delay, Duration::from_secs(2));
    }
}
