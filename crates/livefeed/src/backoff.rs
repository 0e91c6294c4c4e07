//! Reconnect delay policy.
//!
//! Unbounded mode favors rapid early retries that degrade to a ceiling so a
//! down server is not hammered; bounded mode waits a fixed interval and
//! gives up explicitly.

use std::time::Duration;

use crate::config::RetryLimit;

/// Ascending delay schedule for unbounded reconnection, indexed by
/// `attempt - 1` and clamped to the last entry.
const BACKOFF_TABLE_MS: [u64; 7] = [1000, 3000, 5000, 10000, 20000, 30000, 60000];

/// Delay policy for scheduling reconnect attempts.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    limit: RetryLimit,
    fixed_interval: Duration,
}

/// Outcome of asking the policy about one more attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Wait this long, then try again.
    Delay(Duration),
    /// The attempt budget is spent; give up.
    Exhausted,
}

impl BackoffPolicy {
    pub fn new(limit: RetryLimit, fixed_interval: Duration) -> Self {
        Self {
            limit,
            fixed_interval,
        }
    }

    /// Delay before the given attempt (1-based), or `Exhausted` when a
    /// bounded budget is exceeded.
    pub fn delay_for_attempt(&self, attempt: u32) -> Backoff {
        match self.limit {
            RetryLimit::Unbounded => {
                let index = (attempt.saturating_sub(1) as usize).min(BACKOFF_TABLE_MS.len() - 1);
                Backoff::Delay(Duration::from_millis(BACKOFF_TABLE_MS[index]))
            }
            RetryLimit::Bounded(max) => {
                if attempt > max {
                    Backoff::Exhausted
                } else {
                    Backoff::Delay(self.fixed_interval)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unbounded_follows_table_then_clamps() {
        let policy = BackoffPolicy::new(RetryLimit::Unbounded, Duration::from_millis(5000));
        let expected_ms = [1000, 3000, 5000, 10000, 20000, 30000, 60000, 60000];
        for (attempt, ms) in (1..=8).zip(expected_ms) {
            assert_eq!(
                policy.delay_for_attempt(attempt),
                Backoff::Delay(Duration::from_millis(ms)),
                "attempt {attempt}"
            );
        }
    }

    #[test]
    fn unbounded_clamps_far_beyond_table() {
        let policy = BackoffPolicy::new(RetryLimit::Unbounded, Duration::from_millis(5000));
        assert_eq!(
            policy.delay_for_attempt(1000),
            Backoff::Delay(Duration::from_millis(60000))
        );
    }

    #[test]
    fn unbounded_attempt_zero_is_floored() {
        let policy = BackoffPolicy::new(RetryLimit::Unbounded, Duration::from_millis(5000));
        assert_eq!(
            policy.delay_for_attempt(0),
            Backoff::Delay(Duration::from_millis(1000))
        );
    }

    #[test]
    fn bounded_uses_fixed_interval_until_exhausted() {
        let policy = BackoffPolicy::new(RetryLimit::Bounded(5), Duration::from_millis(5000));
        for attempt in 1..=5 {
            assert_eq!(
                policy.delay_for_attempt(attempt),
                Backoff::Delay(Duration::from_millis(5000)),
                "attempt {attempt}"
            );
        }
        assert_eq!(policy.delay_for_attempt(6), Backoff::Exhausted);
    }
}
