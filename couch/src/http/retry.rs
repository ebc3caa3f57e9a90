//! Exponential backoff for re-opening a change feed after a genuine failure.

use std::time::{Duration, SystemTime};

use reqwest_retry::{RetryDecision, RetryPolicy};

/// Doubles the delay after every attempt, capped at `max_delay`.
///
/// With `max_retries == 0` it never retries.
#[derive(Debug, Clone)]
pub struct Backoff {
    max_retries: u32,
    base_delay: Duration,
    max_delay: Duration,
}

impl Backoff {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
        }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    fn exponential_delay(&self, n_attempts: u32) -> Duration {
        let delay = self.base_delay.as_secs_f64() * 2_f64.powi(n_attempts.min(31) as i32);
        Duration::from_secs_f64(delay.min(self.max_delay.as_secs_f64()))
    }

    /// How long to wait before attempt `n_past_retries + 1`, or `None` when
    /// the budget is spent.
    pub fn delay(&self, n_past_retries: u32) -> Option<Duration> {
        match self.should_retry(SystemTime::now(), n_past_retries) {
            RetryDecision::Retry { execute_after } => Some(
                execute_after
                    .duration_since(SystemTime::now())
                    .unwrap_or_default(),
            ),
            RetryDecision::DoNotRetry => None,
        }
    }
}

impl RetryPolicy for Backoff {
    fn should_retry(&self, _request_start_time: SystemTime, n_past_retries: u32) -> RetryDecision {
        if n_past_retries >= self.max_retries {
            RetryDecision::DoNotRetry
        } else {
            RetryDecision::Retry {
                execute_after: SystemTime::now() + self.exponential_delay(n_past_retries),
            }
        }
    }
}
