//! Exponential backoff with jitter for retry scheduling.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rand::Rng;
use std::time::Duration;

/// Retry delay policy: exponential growth from a base delay, capped, with
/// uniform jitter added on top.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Cap on the exponential part of the delay.
    pub max_delay: Duration,
    /// Upper bound of the uniform jitter added to every delay.
    pub jitter: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(30),
            max_delay: Duration::from_secs(3600),
            jitter: Duration::from_secs(5),
        }
    }
}

impl BackoffPolicy {
    /// The delay before retry number `retry_count + 1`.
    #[must_use]
    pub fn delay(&self, retry_count: u32) -> Duration {
        // Saturate rather than overflow for absurd retry counts.
        let exponential = self
            .base_delay
            .checked_mul(2u32.saturating_pow(retry_count.min(31)))
            .unwrap_or(self.max_delay);
        let capped = exponential.min(self.max_delay);

        if self.jitter.is_zero() {
            return capped;
        }
        let jitter_ms = rand::thread_rng().gen_range(0..=self.jitter.as_millis() as u64);
        capped + Duration::from_millis(jitter_ms)
    }

    /// The wall-clock instant of the next retry.
    #[must_use]
    pub fn next_retry_at(&self, now: DateTime<Utc>, retry_count: u32) -> DateTime<Utc> {
        let delay = self.delay(retry_count);
        now + ChronoDuration::milliseconds(delay.as_millis() as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jitterless(base_secs: u64, max_secs: u64) -> BackoffPolicy {
        BackoffPolicy {
            base_delay: Duration::from_secs(base_secs),
            max_delay: Duration::from_secs(max_secs),
            jitter: Duration::ZERO,
        }
    }

    #[test]
    fn exponential_growth() {
        let policy = jitterless(30, 3600);
        assert_eq!(policy.delay(0), Duration::from_secs(30));
        assert_eq!(policy.delay(1), Duration::from_secs(60));
        assert_eq!(policy.delay(2), Duration::from_secs(120));
        assert_eq!(policy.delay(3), Duration::from_secs(240));
    }

    #[test]
    fn capped_at_max_delay() {
        let policy = jitterless(30, 3600);
        assert_eq!(policy.delay(10), Duration::from_secs(3600));
        assert_eq!(policy.delay(63), Duration::from_secs(3600));
    }

    #[test]
    fn jitter_stays_within_bound() {
        let policy = BackoffPolicy {
            base_delay: Duration::from_secs(10),
            max_delay: Duration::from_secs(100),
            jitter: Duration::from_secs(2),
        };
        for _ in 0..50 {
            let delay = policy.delay(0);
            assert!(delay >= Duration::from_secs(10));
            assert!(delay <= Duration::from_secs(12));
        }
    }

    #[test]
    fn next_retry_at_is_in_the_future() {
        let policy = jitterless(30, 3600);
        let now = Utc::now();
        let at = policy.next_retry_at(now, 1);
        assert_eq!(at, now + ChronoDuration::seconds(60));
    }
}
