//! Cooldown after Discord rate limits.

use std::time::Duration;

/// Doubling cooldown for consecutive rate limits.
///
/// Each signal waits at least twice the previous wait (starting from `base`),
/// at least the server's retry-after, and at most `cap`. A successful edit
/// resets it.
#[derive(Debug, Clone)]
pub struct RateLimitBackoff {
    base: Duration,
    cap: Duration,
    current: Option<Duration>,
}

impl Default for RateLimitBackoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(5), Duration::from_secs(300))
    }
}

impl RateLimitBackoff {
    pub fn new(base: Duration, cap: Duration) -> Self {
        Self {
            base,
            cap: cap.max(base),
            current: None,
        }
    }

    /// Record a rate limit and return how long to wait.
    pub fn on_rate_limited(&mut self, retry_after: Option<Duration>) -> Duration {
        let doubled = match self.current {
            Some(prev) => prev.saturating_mul(2),
            None => self.base,
        };
        let next = doubled
            .max(retry_after.unwrap_or(Duration::ZERO))
            .min(self.cap);
        self.current = Some(next);
        next
    }

    /// Forget previous rate limits.
    pub fn reset(&mut self) {
        self.current = None;
    }

    /// The wait chosen for the latest rate limit, if one is outstanding.
    pub fn current(&self) -> Option<Duration> {
        self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_doubles_then_caps() {
        let mut backoff = RateLimitBackoff::default();
        let waits: Vec<u64> = (0..8)
            .map(|_| backoff.on_rate_limited(None).as_secs())
            .collect();
        assert_eq!(waits, vec![5, 10, 20, 40, 80, 160, 300, 300]);
    }

    #[test]
    fn test_honours_larger_retry_after() {
        let mut backoff = RateLimitBackoff::default();
        assert_eq!(
            backoff.on_rate_limited(Some(Duration::from_secs(42))),
            Duration::from_secs(42)
        );
        assert_eq!(backoff.on_rate_limited(None), Duration::from_secs(84));
    }

    #[test]
    fn test_reset_after_success() {
        let mut backoff = RateLimitBackoff::default();
        backoff.on_rate_limited(None);
        backoff.on_rate_limited(None);
        backoff.reset();
        assert_eq!(backoff.current(), None);
        assert_eq!(backoff.on_rate_limited(None), Duration::from_secs(5));
    }

    proptest! {
        #[test]
        fn backoff_is_monotonic_and_bounded(
            hints in prop::collection::vec(prop::option::of(0u64..1000), 1..20)
        ) {
            let mut backoff = RateLimitBackoff::default();
            let mut prev = Duration::ZERO;
            for hint in hints {
                let wait = backoff.on_rate_limited(hint.map(Duration::from_secs));
                prop_assert!(wait >= prev);
                prop_assert!(wait <= Duration::from_secs(300));
                prop_assert!(wait >= Duration::from_secs(5));
                prev = wait;
            }
        }
    }
}
