//! Reconnection backoff for the log-stream supervisor.
//!
//! This module provides:
//! - [`compute_backoff`]: exponential-backoff delay calculator with an optional cap.
//! - [`is_transient`]: classifies a [`LogStreamError`] as retryable or not.
//! - [`RetryState`]: the per-connector failure streak counter.

use crate::config::RetryConfig;
use crate::utils::error::LogStreamError;
use std::time::Duration;

// ─────────────────────────────────────────────────────────────────────────────
// Backoff calculation
// ─────────────────────────────────────────────────────────────────────────────

/// Computes the delay before retry number `attempt`.
///
/// `attempt` is 0-indexed: `attempt = 0` is the delay before the first retry.
///
/// Formula: `delay = initial_delay * 2^attempt`, capped at `max_delay` when one
/// is configured. Overflow saturates instead of wrapping.
#[must_use]
pub fn compute_backoff(cfg: &RetryConfig, attempt: u32) -> Duration {
    let base = match 2u32.checked_pow(attempt) {
        Some(factor) => cfg.initial_delay.saturating_mul(factor),
        None => Duration::MAX,
    };

    match cfg.max_delay {
        Some(cap) => base.min(cap),
        None => base,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Error classification
// ─────────────────────────────────────────────────────────────────────────────

/// Returns `true` if `err` represents a transient failure that is safe to retry.
///
/// | Error variant            | Retried | Reason                                     |
/// |--------------------------|---------|--------------------------------------------|
/// | `ConnectionError`        | ✅      | Handshake / send / receive failure          |
/// | `Timeout`                | ✅      | Handshake or acknowledgment wait elapsed   |
/// | `SubscriptionRejected`   | ✅      | Node overloaded or still starting          |
/// | `InternalError`          | ✅      | tokio task join noise                      |
/// | `ConfigError`            | ❌      | Programmer error                           |
/// | `ProtocolError`          | ❌      | Logged and skipped, never a reconnect      |
/// | `HandlerError`           | ❌      | Consumer-side, not a transport concern     |
/// | `RetryExhausted`         | ❌      | Already exhausted                          |
#[must_use]
pub fn is_transient(err: &LogStreamError) -> bool {
    matches!(
        err,
        LogStreamError::ConnectionError(_)
            | LogStreamError::Timeout(_)
            | LogStreamError::SubscriptionRejected { .. }
            | LogStreamError::InternalError(_)
    )
}

// ─────────────────────────────────────────────────────────────────────────────
// RetryState
// ─────────────────────────────────────────────────────────────────────────────

/// Counters for one unresolved failure streak.
///
/// Owned by a single connector loop. `attempt` never exceeds
/// `config.max_retries`; once it would, [`RetryState::next_delay`] returns
/// `None` and the connector must give up.
#[derive(Debug, Clone)]
pub struct RetryState {
    config: RetryConfig,
    attempt: u32,
}

impl RetryState {
    /// Creates a fresh streak with `attempt = 0`.
    #[must_use]
    pub fn new(config: RetryConfig) -> Self {
        Self { config, attempt: 0 }
    }

    /// Number of retries already scheduled in this streak.
    #[must_use]
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Total connection attempts made in this streak (the initial one plus retries).
    #[must_use]
    pub fn attempts_made(&self) -> u32 {
        self.attempt.saturating_add(1)
    }

    /// Delay that the next call to [`RetryState::next_delay`] would return.
    #[must_use]
    pub fn peek_delay(&self) -> Option<Duration> {
        if self.attempt >= self.config.max_retries {
            None
        } else {
            Some(compute_backoff(&self.config, self.attempt))
        }
    }

    /// Returns the delay to wait before the next attempt and advances the
    /// counter, or `None` if the retry budget is spent.
    pub fn next_delay(&mut self) -> Option<Duration> {
        let delay = self.peek_delay()?;
        self.attempt += 1;
        Some(delay)
    }

    /// Ends the streak after a successful subscription.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(max_retries: u32) -> RetryConfig {
        RetryConfig {
            max_retries,
            initial_delay: Duration::from_secs(1),
            max_delay: None,
        }
    }

    // ── backoff ───────────────────────────────────────────────────────────────

    #[test]
    fn test_compute_backoff_doubles() {
        let cfg = cfg(5);
        assert_eq!(compute_backoff(&cfg, 0), Duration::from_secs(1));
        assert_eq!(compute_backoff(&cfg, 1), Duration::from_secs(2));
        assert_eq!(compute_backoff(&cfg, 2), Duration::from_secs(4));
        assert_eq!(compute_backoff(&cfg, 5), Duration::from_secs(32));
    }

    #[test]
    fn test_compute_backoff_capped() {
        let cfg = RetryConfig {
            max_delay: Some(Duration::from_secs(5)),
            ..cfg(10)
        };
        assert_eq!(compute_backoff(&cfg, 2), Duration::from_secs(4));
        assert_eq!(compute_backoff(&cfg, 3), Duration::from_secs(5));
        assert_eq!(compute_backoff(&cfg, 9), Duration::from_secs(5));
    }

    #[test]
    fn test_compute_backoff_saturates() {
        let cfg = cfg(100);
        assert_eq!(compute_backoff(&cfg, 64), Duration::MAX);
    }

    // ── is_transient ──────────────────────────────────────────────────────────

    #[test]
    fn test_is_transient_connection_error() {
        assert!(is_transient(&LogStreamError::ConnectionError(
            "reset".into()
        )));
        assert!(is_transient(&LogStreamError::Timeout("ack".into())));
    }

    #[test]
    fn test_is_transient_config_false() {
        assert!(!is_transient(&LogStreamError::ConfigError("bad".into())));
        assert!(!is_transient(&LogStreamError::ProtocolError("bad".into())));
    }

    // ── RetryState ────────────────────────────────────────────────────────────

    #[test]
    fn test_retry_state_exhausts_after_max_retries() {
        let mut state = RetryState::new(cfg(2));
        assert_eq!(state.next_delay(), Some(Duration::from_secs(1)));
        assert_eq!(state.next_delay(), Some(Duration::from_secs(2)));
        assert_eq!(state.attempt(), 2);
        assert_eq!(state.next_delay(), None);
        assert_eq!(state.attempt(), 2, "counter must not pass max_retries");
        assert_eq!(state.attempts_made(), 3);
    }

    #[test]
    fn test_retry_state_reset() {
        let mut state = RetryState::new(cfg(3));
        state.next_delay();
        state.next_delay();
        state.reset();
        assert_eq!(state.attempt(), 0);
        assert_eq!(state.peek_delay(), Some(Duration::from_secs(1)));
    }

    #[test]
    fn test_delays_monotonic_across_streak() {
        let mut state = RetryState::new(cfg(8));
        let mut last = Duration::ZERO;
        while let Some(delay) = state.next_delay() {
            assert!(delay >= last, "{delay:?} < {last:?}");
            last = delay;
        }
    }
}
