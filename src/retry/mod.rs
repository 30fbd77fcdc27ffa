//! Retry policy for poll failures

mod backoff;

pub use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};

use crate::client::KinesisClientError;
use std::time::Duration;
use tracing::trace;

/// What the tailer should do after a failed poll
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Poll again at the same position after the delay
    RetryAfter(Duration),
    /// Acquire a fresh iterator before polling again
    RefreshIterator,
    /// Give up and surface the error
    Fail,
}

/// Error-kind-aware poll retry policy
///
/// Throttling backs off exponentially, permanent errors (access, missing
/// stream, bad argument, KMS) fail fast, expired iterators are refreshed and
/// anything else is retried after `error_delay`.
#[derive(Debug, Clone)]
pub struct PollRetryPolicy {
    /// Delay before retrying a transient failure
    pub error_delay: Duration,
    /// Backoff for throttling errors; `None` treats them like other transient errors
    pub throttle_backoff: Option<ExponentialBackoff>,
    /// Stop on errors that retrying cannot fix
    pub fail_fast_on_permanent: bool,
    /// Stop after this many consecutive failures (None for unbounded)
    pub max_consecutive_failures: Option<u32>,
}

impl Default for PollRetryPolicy {
    fn default() -> Self {
        let error_delay = Duration::from_secs(1);
        Self {
            error_delay,
            throttle_backoff: Some(
                ExponentialBackoff::builder()
                    .initial_delay(error_delay)
                    .max_delay(Duration::from_secs(30))
                    .build(),
            ),
            fail_fast_on_permanent: true,
            max_consecutive_failures: None,
        }
    }
}

impl PollRetryPolicy {
    /// Fixed delay on every error, never giving up
    pub fn uniform(delay: Duration) -> Self {
        Self {
            error_delay: delay,
            throttle_backoff: None,
            fail_fast_on_permanent: false,
            max_consecutive_failures: None,
        }
    }

    /// `consecutive_failures` counts the current failure, so it starts at 1
    pub fn decide(&self, error: &KinesisClientError, consecutive_failures: u32) -> RetryDecision {
        if let Some(max) = self.max_consecutive_failures {
            if consecutive_failures >= max {
                return RetryDecision::Fail;
            }
        }

        let decision = match error {
            KinesisClientError::ExpiredIterator => RetryDecision::RefreshIterator,
            e if e.is_permanent() && self.fail_fast_on_permanent => RetryDecision::Fail,
            e if e.is_throttling() => match &self.throttle_backoff {
                Some(backoff) => {
                    RetryDecision::RetryAfter(backoff.next_delay(consecutive_failures.saturating_sub(1)))
                }
                None => RetryDecision::RetryAfter(self.error_delay),
            },
            _ => RetryDecision::RetryAfter(self.error_delay),
        };

        trace!(
            error = %error,
            consecutive_failures = consecutive_failures,
            decision = ?decision,
            "Poll retry decision"
        );

        decision
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_jitter_policy() -> PollRetryPolicy {
        PollRetryPolicy {
            error_delay: Duration::from_millis(50),
            throttle_backoff: Some(
                ExponentialBackoff::builder()
                    .initial_delay(Duration::from_millis(50))
                    .max_delay(Duration::from_millis(300))
                    .jitter_factor(0.0)
                    .build(),
            ),
            ..Default::default()
        }
    }

    #[test]
    fn test_transient_errors_use_fixed_delay() {
        let policy = no_jitter_policy();
        for attempt in 1..10 {
            assert_eq!(
                policy.decide(&KinesisClientError::Timeout("slow".to_string()), attempt),
                RetryDecision::RetryAfter(Duration::from_millis(50))
            );
        }
        assert_eq!(
            policy.decide(&KinesisClientError::Other("500".to_string()), 1),
            RetryDecision::RetryAfter(Duration::from_millis(50))
        );
    }

    #[test]
    fn test_throttling_backs_off() {
        let policy = no_jitter_policy();
        let err = KinesisClientError::ThroughputExceeded;

        assert_eq!(policy.decide(&err, 1), RetryDecision::RetryAfter(Duration::from_millis(50)));
        assert_eq!(policy.decide(&err, 2), RetryDecision::RetryAfter(Duration::from_millis(100)));
        assert_eq!(policy.decide(&err, 3), RetryDecision::RetryAfter(Duration::from_millis(200)));
        assert_eq!(policy.decide(&err, 8), RetryDecision::RetryAfter(Duration::from_millis(300)));
    }

    #[test]
    fn test_permanent_errors_fail_fast() {
        let policy = PollRetryPolicy::default();
        assert_eq!(policy.decide(&KinesisClientError::AccessDenied, 1), RetryDecision::Fail);
        assert_eq!(
            policy.decide(&KinesisClientError::ResourceNotFound("gone".to_string()), 1),
            RetryDecision::Fail
        );
    }

    #[test]
    fn test_expired_iterator_refreshes() {
        let policy = PollRetryPolicy::default();
        assert_eq!(
            policy.decide(&KinesisClientError::ExpiredIterator, 1),
            RetryDecision::RefreshIterator
        );
    }

    #[test]
    fn test_uniform_policy_never_gives_up() {
        let policy = PollRetryPolicy::uniform(Duration::from_secs(1));
        for err in [
            KinesisClientError::AccessDenied,
            KinesisClientError::ThroughputExceeded,
            KinesisClientError::ConnectionError("reset".to_string()),
        ] {
            assert_eq!(
                policy.decide(&err, 1_000),
                RetryDecision::RetryAfter(Duration::from_secs(1))
            );
        }
    }

    #[test]
    fn test_consecutive_failure_limit() {
        let policy = PollRetryPolicy {
            max_consecutive_failures: Some(3),
            ..no_jitter_policy()
        };
        let err = KinesisClientError::Timeout("slow".to_string());

        assert!(matches!(policy.decide(&err, 2), RetryDecision::RetryAfter(_)));
        assert_eq!(policy.decide(&err, 3), RetryDecision::Fail);
    }
}
