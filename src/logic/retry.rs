// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Alexander Minges

//! Bounded retry with linear backoff for one-shot service calls.

use std::thread;
use std::time::Duration;

use tracing::warn;

/// Errors that can tell whether another attempt could succeed.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first; values below 1 behave as 1.
    pub max_attempts: usize,
    pub base_backoff_ms: u64,
}

impl Default for RetryPolicy {
    /// A single attempt: failures surface immediately and the operator retries.
    fn default() -> Self {
        Self {
            max_attempts: 1,
            base_backoff_ms: 250,
        }
    }
}

impl RetryPolicy {
    /// Run `op` until it succeeds, fails with a non-retryable error, or attempts run out.
    ///
    /// Sleeps `base_backoff_ms * attempt` between attempts.
    pub fn run<T, E, F>(&self, label: &str, mut op: F) -> Result<T, E>
    where
        E: Retryable + std::fmt::Display,
        F: FnMut() -> Result<T, E>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match op() {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt < max_attempts => {
                    warn!(call = label, attempt, error = %err, "service call failed, retrying");
                    thread::sleep(Duration::from_millis(
                        self.base_backoff_ms.saturating_mul(attempt as u64),
                    ));
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::fmt;

    use super::{RetryPolicy, Retryable};

    #[derive(Debug, PartialEq)]
    struct Flaky(bool);

    impl fmt::Display for Flaky {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "flaky retryable={}", self.0)
        }
    }

    impl Retryable for Flaky {
        fn is_retryable(&self) -> bool {
            self.0
        }
    }

    fn policy(max_attempts: usize) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_backoff_ms: 0,
        }
    }

    #[test]
    fn default_policy_makes_one_attempt() {
        let calls = Cell::new(0);
        let res: Result<(), Flaky> = RetryPolicy {
            base_backoff_ms: 0,
            ..Default::default()
        }
        .run("test", || {
            calls.set(calls.get() + 1);
            Err(Flaky(true))
        });
        assert_eq!(res, Err(Flaky(true)));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn retries_until_success() {
        let calls = Cell::new(0);
        let res = policy(4).run("test", || {
            calls.set(calls.get() + 1);
            if calls.get() < 3 { Err(Flaky(true)) } else { Ok(calls.get()) }
        });
        assert_eq!(res, Ok(3));
    }

    #[test]
    fn stops_at_max_attempts() {
        let calls = Cell::new(0);
        let res: Result<(), Flaky> = policy(3).run("test", || {
            calls.set(calls.get() + 1);
            Err(Flaky(true))
        });
        assert!(res.is_err());
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn non_retryable_errors_return_immediately() {
        let calls = Cell::new(0);
        let res: Result<(), Flaky> = policy(5).run("test", || {
            calls.set(calls.get() + 1);
            Err(Flaky(false))
        });
        assert_eq!(res, Err(Flaky(false)));
        assert_eq!(calls.get(), 1);
    }
}
