//! Retry accounting for the session's "try again until it works" loops.
//!
//! The defaults are unbounded with no backoff. A policy only decides whether
//! another attempt is allowed and how long to wait; callers own the sleeping.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Bounds for one retry loop (refusals, missing code blocks, compile repairs).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts allowed, including the first. `None` means unbounded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
    /// Delay before each retry, multiplied by the retry number.
    pub backoff_ms: u64,
}

impl RetryPolicy {
    pub const UNBOUNDED: Self = Self {
        max_attempts: None,
        backoff_ms: 0,
    };

    pub fn bounded(max_attempts: u32) -> Self {
        Self {
            max_attempts: Some(max_attempts),
            backoff_ms: 0,
        }
    }

    /// Whether attempt number `attempt` (1-based) may run.
    pub fn allows(&self, attempt: u32) -> bool {
        match self.max_attempts {
            Some(max) => attempt <= max,
            None => true,
        }
    }

    /// Delay to wait before attempt number `attempt` (1-based). The first attempt never waits.
    pub fn delay_before(&self, attempt: u32) -> Duration {
        let retries = u64::from(attempt.saturating_sub(1));
        Duration::from_millis(self.backoff_ms.saturating_mul(retries))
    }
}

/// Attempt counter tied to a policy.
#[derive(Debug, Clone)]
pub struct Attempts {
    policy: RetryPolicy,
    made: u32,
}

impl Attempts {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy, made: 0 }
    }

    /// Claim the next attempt. Returns its delay, or `None` once the policy is exhausted.
    pub fn next(&mut self) -> Option<Duration> {
        let attempt = self.made.saturating_add(1);
        if !self.policy.allows(attempt) {
            return None;
        }
        self.made = attempt;
        Some(self.policy.delay_before(attempt))
    }

    /// Attempts claimed so far.
    pub fn made(&self) -> u32 {
        self.made
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unbounded_policy_always_allows() {
        let policy = RetryPolicy::UNBOUNDED;
        assert!(policy.allows(1));
        assert!(policy.allows(u32::MAX));
        assert_eq!(policy.delay_before(50), Duration::ZERO);
    }

    #[test]
    fn bounded_attempts_stop_after_max() {
        let mut attempts = Attempts::new(RetryPolicy::bounded(2));
        assert!(attempts.next().is_some());
        assert!(attempts.next().is_some());
        assert!(attempts.next().is_none());
        assert_eq!(attempts.made(), 2);
    }

    #[test]
    fn backoff_grows_linearly_with_retries() {
        let policy = RetryPolicy {
            max_attempts: None,
            backoff_ms: 100,
        };
        assert_eq!(policy.delay_before(1), Duration::ZERO);
        assert_eq!(policy.delay_before(2), Duration::from_millis(100));
        assert_eq!(policy.delay_before(4), Duration::from_millis(300));
    }

    #[test]
    fn unbounded_counter_saturates_instead_of_overflowing() {
        let mut attempts = Attempts {
            policy: RetryPolicy::UNBOUNDED,
            made: u32::MAX,
        };
        assert!(attempts.next().is_some());
        assert_eq!(attempts.made(), u32::MAX);
    }

    #[test]
    fn zero_max_attempts_allows_nothing() {
        let mut attempts = Attempts::new(RetryPolicy::bounded(0));
        assert!(attempts.next().is_none());
    }
}
