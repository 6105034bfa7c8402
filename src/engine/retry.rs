// src/engine/retry.rs
// =============================================================================
// When to try a failed lookup again.
//
// - Transient: exponential backoff, base * 2^(attempt-1), capped at max_delay
// - RateLimited: the service's own reset hint when it sent one, otherwise a
//   fixed, longer delay. A patience limit (max_rate_limit_wait) is opt-in;
//   without one every hint is waited out
// - Both count against the same max_attempts ceiling
//
// Invalid identifiers never reach this module: they are confirmed verdicts,
// not failures.
// =============================================================================

use std::time::Duration;

use crate::checker::{FailureKind, ProbeFailure};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    RetryAfter(Duration),
    GiveUp,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total lookups allowed per identifier, the first one included.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Used for RateLimited failures that came without a hint.
    pub rate_limit_delay: Duration,
    /// Longest reset hint we are willing to sleep through; `None` waits out any hint.
    pub max_rate_limit_wait: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            rate_limit_delay: Duration::from_secs(30),
            max_rate_limit_wait: None,
        }
    }
}

impl RetryPolicy {
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// `attempt` is the number of lookups already made for this identifier (1-based).
    pub fn decide(&self, attempt: u32, failure: &ProbeFailure) -> RetryDecision {
        if attempt >= self.max_attempts {
            return RetryDecision::GiveUp;
        }

        match failure.kind {
            FailureKind::Transient => RetryDecision::RetryAfter(self.backoff(attempt)),
            FailureKind::RateLimited => match failure.retry_after {
                Some(hint) if self.max_rate_limit_wait.is_some_and(|limit| hint > limit) => RetryDecision::GiveUp,
                Some(hint) => RetryDecision::RetryAfter(hint.max(self.base_delay)),
                None => RetryDecision::RetryAfter(self.rate_limit_delay),
            },
        }
    }

    fn backoff(&self, attempt: u32) -> Duration {
        // Cap the exponent so the multiplication can't overflow
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_delay
            .checked_mul(1 << exponent)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outcome::DiagnosticKind;

    fn transient() -> ProbeFailure {
        ProbeFailure::transient(DiagnosticKind::Timeout, "request timed out")
    }

    #[test]
    fn test_transient_backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 10,
            ..RetryPolicy::default()
        };
        assert_eq!(policy.decide(1, &transient()), RetryDecision::RetryAfter(Duration::from_millis(500)));
        assert_eq!(policy.decide(2, &transient()), RetryDecision::RetryAfter(Duration::from_secs(1)));
        assert_eq!(policy.decide(3, &transient()), RetryDecision::RetryAfter(Duration::from_secs(2)));
        assert_eq!(policy.decide(9, &transient()), RetryDecision::RetryAfter(Duration::from_secs(8)));
    }

    #[test]
    fn test_gives_up_at_max_attempts() {
        let policy = RetryPolicy::default();
        assert!(matches!(policy.decide(2, &transient()), RetryDecision::RetryAfter(_)));
        assert_eq!(policy.decide(3, &transient()), RetryDecision::GiveUp);

        let limited = ProbeFailure::rate_limited("HTTP 429", Some(Duration::from_secs(1)));
        assert_eq!(policy.decide(3, &limited), RetryDecision::GiveUp);
    }

    #[test]
    fn test_rate_limit_delay_respects_hint() {
        let policy = RetryPolicy::default();
        let hint = Duration::from_secs(45);
        match policy.decide(1, &ProbeFailure::rate_limited("HTTP 403", Some(hint))) {
            RetryDecision::RetryAfter(delay) => assert!(delay >= hint),
            other => panic!("expected retry, got {other:?}"),
        }

        // A zero hint still waits at least the base delay
        assert_eq!(
            policy.decide(1, &ProbeFailure::rate_limited("HTTP 403", Some(Duration::ZERO))),
            RetryDecision::RetryAfter(policy.base_delay)
        );
    }

    #[test]
    fn test_rate_limit_without_hint_uses_longer_fixed_delay() {
        let policy = RetryPolicy::default();
        assert_eq!(
            policy.decide(1, &ProbeFailure::rate_limited("HTTP 429", None)),
            RetryDecision::RetryAfter(policy.rate_limit_delay)
        );
        assert!(policy.rate_limit_delay > policy.max_delay);
    }

    #[test]
    fn test_long_hint_is_waited_out_by_default() {
        let policy = RetryPolicy::default();
        let hint = Duration::from_secs(1800);
        match policy.decide(1, &ProbeFailure::rate_limited("HTTP 403", Some(hint))) {
            RetryDecision::RetryAfter(delay) => assert!(delay >= hint, "{delay:?}"),
            other => panic!("expected retry, got {other:?}"),
        }
        // Still bounded by the attempt ceiling
        assert_eq!(
            policy.decide(3, &ProbeFailure::rate_limited("HTTP 403", Some(hint))),
            RetryDecision::GiveUp
        );
    }

    #[test]
    fn test_hint_beyond_opt_in_patience_gives_up() {
        let policy = RetryPolicy {
            max_rate_limit_wait: Some(Duration::from_secs(120)),
            ..RetryPolicy::default()
        };
        let failure = ProbeFailure::rate_limited("HTTP 403", Some(Duration::from_secs(3600)));
        assert_eq!(policy.decide(1, &failure), RetryDecision::GiveUp);

        let short = ProbeFailure::rate_limited("HTTP 403", Some(Duration::from_secs(60)));
        assert_eq!(policy.decide(1, &short), RetryDecision::RetryAfter(Duration::from_secs(60)));
    }

    #[test]
    fn test_max_attempts_is_at_least_one() {
        let policy = RetryPolicy::default().with_max_attempts(0);
        assert_eq!(policy.max_attempts, 1);
        assert_eq!(policy.decide(1, &transient()), RetryDecision::GiveUp);
    }
}
