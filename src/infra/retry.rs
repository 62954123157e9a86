//! Bounded retry for operations that talk to a key token or a persistent store.
//!
//! Token-facing calls fail intermittently while the device is busy or being
//! re-enumerated. The policy retries them a fixed number of times with a
//! doubling wait and hands back the last error unchanged.

use crate::infra::error::{CspError, CspResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Retry schedule applied to token-facing operations.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one
    pub attempts: u32,
    /// Wait before the second attempt, in milliseconds
    pub initial_delay_ms: u64,
    /// Multiplier applied to the wait after every failed attempt
    pub backoff_factor: u32,
}

impl Default for RetryPolicy {
    /// Four attempts waiting 0.25 s, 0.5 s and 1 s in between.
    fn default() -> Self {
        Self {
            attempts: 4,
            initial_delay_ms: 250,
            backoff_factor: 2,
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no waiting.
    #[must_use]
    pub fn none() -> Self {
        Self {
            attempts: 1,
            initial_delay_ms: 0,
            backoff_factor: 1,
        }
    }

    /// Wait inserted after the given failed attempt (1-based).
    #[must_use]
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = u64::from(self.backoff_factor.max(1));
        let exp = attempt.saturating_sub(1);
        let mut delay = self.initial_delay_ms;
        for _ in 0..exp {
            delay = delay.saturating_mul(factor);
        }
        Duration::from_millis(delay)
    }

    /// Worst-case time spent sleeping across all attempts.
    #[must_use]
    pub fn total_wait(&self) -> Duration {
        (1..self.attempts.max(1)).map(|a| self.delay_after(a)).sum()
    }

    /// Run `op`, retrying transient failures.
    ///
    /// Errors for which [`CspError::is_transient`] is false are returned at
    /// once. After the last attempt the final error is returned as-is.
    ///
    /// # Errors
    /// Returns the error of the last attempt made.
    pub fn run<T, F>(&self, what: &str, mut op: F) -> CspResult<T>
    where
        F: FnMut() -> CspResult<T>,
    {
        let attempts = self.attempts.max(1);
        let mut last_err: Option<CspError> = None;
        for attempt in 1..=attempts {
            match op() {
                Ok(value) => {
                    if attempt > 1 {
                        log::debug!("{what} succeeded on attempt {attempt} of {attempts}");
                    }
                    return Ok(value);
                }
                Err(e) if !e.is_transient() => return Err(e),
                Err(e) => {
                    log::warn!("{what} failed (attempt {attempt} of {attempts}): {e}");
                    last_err = Some(e);
                    if attempt < attempts {
                        std::thread::sleep(self.delay_after(attempt));
                    }
                }
            }
        }
        Err(last_err
            .unwrap_or_else(|| CspError::StateError(format!("{what}: no attempt was made"))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_default_schedule() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_after(1), Duration::from_millis(250));
        assert_eq!(policy.delay_after(2), Duration::from_millis(500));
        assert_eq!(policy.delay_after(3), Duration::from_millis(1000));
        assert_eq!(policy.total_wait(), Duration::from_millis(1750));
    }

    #[test]
    fn test_reraises_final_error_unchanged() {
        let policy = RetryPolicy {
            attempts: 3,
            initial_delay_ms: 0,
            backoff_factor: 2,
        };
        let calls = Cell::new(0);
        let result: CspResult<()> = policy.run("test op", || {
            calls.set(calls.get() + 1);
            Err(CspError::CryptoFailure(format!("busy {}", calls.get())))
        });
        assert_eq!(calls.get(), 3);
        match result {
            Err(CspError::CryptoFailure(msg)) => assert_eq!(msg, "busy 3"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_succeeds_after_transient_failures() {
        let policy = RetryPolicy {
            attempts: 4,
            initial_delay_ms: 0,
            backoff_factor: 2,
        };
        let calls = Cell::new(0);
        let value = policy
            .run("flaky", || {
                calls.set(calls.get() + 1);
                if calls.get() < 3 {
                    Err(CspError::CryptoFailure("busy".into()))
                } else {
                    Ok(42)
                }
            })
            .unwrap();
        assert_eq!(value, 42);
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn test_deterministic_errors_not_retried() {
        let policy = RetryPolicy {
            attempts: 4,
            initial_delay_ms: 0,
            backoff_factor: 2,
        };
        let calls = Cell::new(0);
        let result: CspResult<()> = policy.run("parse", || {
            calls.set(calls.get() + 1);
            Err(CspError::FormatError("garbage".into()))
        });
        assert!(matches!(result, Err(CspError::FormatError(_))));
        assert_eq!(calls.get(), 1);
    }
}
