//! Rate-limit retry contract and injectable sleeping.
//!
//! On [`DataError::RateLimited`] the caller waits a fixed interval and repeats
//! the same request. The reference policy never gives up; a cap can be set for
//! runs that prefer bounded latency. All waits go through a [`Sleeper`] so tests
//! never block on the wall clock.

use std::sync::Mutex;
use std::time::Duration;

use chrono::NaiveDate;
use tracing::warn;

use super::provider::{DataError, Listing, SourceFetcher};

/// Something that can block the current thread for a duration.
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration);
}

/// Real sleeper backed by `std::thread::sleep`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            std::thread::sleep(duration);
        }
    }
}

/// Sleeper that records requested durations instead of waiting.
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    calls: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every duration requested so far, in order.
    pub fn calls(&self) -> Vec<Duration> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Sum of all requested durations.
    pub fn total(&self) -> Duration {
        self.calls().iter().sum()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(duration);
        }
    }
}

/// How long to wait after a rate-limit response, and how often to try.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Fixed wait between attempts.
    pub wait: Duration,
    /// Total attempts allowed; `None` retries forever.
    pub max_attempts: Option<u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            wait: Duration::from_secs(60),
            max_attempts: None,
        }
    }
}

impl RetryPolicy {
    pub fn unbounded(wait: Duration) -> Self {
        Self {
            wait,
            max_attempts: None,
        }
    }

    pub fn capped(wait: Duration, max_attempts: u32) -> Self {
        Self {
            wait,
            max_attempts: Some(max_attempts.max(1)),
        }
    }
}

/// Fetch one day, waiting and retrying while the source reports rate limiting.
///
/// Any other error is returned immediately. With a capped policy, running out
/// of attempts yields [`DataError::RateLimitExhausted`].
pub fn fetch_with_retry(
    fetcher: &dyn SourceFetcher,
    day: NaiveDate,
    policy: &RetryPolicy,
    sleeper: &dyn Sleeper,
) -> Result<Vec<Listing>, DataError> {
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        match fetcher.fetch_day(day) {
            Err(e) if e.is_rate_limited() => {
                if let Some(max) = policy.max_attempts {
                    if attempt >= max {
                        return Err(DataError::RateLimitExhausted { attempts: attempt });
                    }
                }
                warn!(
                    source = fetcher.name(),
                    date = %day,
                    attempt,
                    wait_secs = policy.wait.as_secs(),
                    "rate limited, waiting before retry"
                );
                sleeper.sleep(policy.wait);
            }
            other => return other,
        }
    }
}
