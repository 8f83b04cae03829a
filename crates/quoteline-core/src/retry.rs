//! Retry with exponential backoff for single quote requests

use std::sync::atomic::AtomicBool;
use std::time::{Duration, Instant};

use crate::error::FetchError;
use crate::shutdown::should_stop;

/// Longest uninterrupted sleep while waiting out a backoff
const STOP_POLL: Duration = Duration::from_millis(25);

/// How often and how patiently a transport fault is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt (total requests = `max_retries + 1`)
    pub max_retries: u32,
    /// Base unit of the backoff: the n-th retry waits `unit * 2^n`
    pub backoff_unit: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_unit: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Exponential backoff: 2^attempt units (2, 4, 8, ...)
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.backoff_unit.saturating_mul(2u32.saturating_pow(attempt))
    }
}

/// Final result of a retried operation and how many backoff waits it cost.
#[derive(Debug)]
pub struct Attempted<T> {
    pub result: Result<T, FetchError>,
    pub backoffs: u32,
}

/// Retry a fallible request with exponential backoff.
///
/// Retryable errors are logged, waited on, and retried up to
/// `policy.max_retries` times. Once `stop` (or the process shutdown flag) is
/// raised no further attempt is made, even mid-backoff, and the last error
/// is returned.
pub fn retry_with_backoff<T>(
    label: &str,
    policy: &RetryPolicy,
    stop: &AtomicBool,
    mut attempt_fn: impl FnMut() -> Result<T, FetchError>,
) -> Attempted<T> {
    let mut attempt = 0u32;
    loop {
        match attempt_fn() {
            Ok(v) => {
                return Attempted {
                    result: Ok(v),
                    backoffs: attempt,
                };
            }
            Err(e)
                if attempt < policy.max_retries
                    && e.is_retryable()
                    && !should_stop(stop) =>
            {
                let delay = policy.backoff(attempt + 1);
                log::debug!(
                    "{label}: attempt {}/{} failed: {e}, retrying in {delay:?}",
                    attempt + 1,
                    policy.max_retries
                );
                if !wait_unless_stopped(delay, stop) {
                    log::debug!("{label}: stopped during backoff, not retrying");
                    return Attempted {
                        result: Err(e),
                        backoffs: attempt,
                    };
                }
                attempt += 1;
            }
            Err(e) => {
                if e.is_retryable() {
                    log::debug!("{label}: giving up after {attempt} retries: {e}");
                }
                return Attempted {
                    result: Err(e),
                    backoffs: attempt,
                };
            }
        }
    }
}

/// Sleep for `delay` in short steps. Returns false as soon as `stop` is seen.
fn wait_unless_stopped(delay: Duration, stop: &AtomicBool) -> bool {
    let deadline = Instant::now() + delay;
    loop {
        if should_stop(stop) {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        std::thread::sleep((deadline - now).min(STOP_POLL));
    }
}
