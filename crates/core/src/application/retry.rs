// Retry logic for failed jobs and outbox relay attempts
use crate::config::JobsConfig;
use crate::domain::JobStatus;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Next state of a job after a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Requeue the job after `delay`
    Retry { retries: u32, delay: Duration },
    /// Retries exhausted, job has failed permanently
    Fail { retries: u32 },
}

impl RetryDecision {
    pub fn retries(&self) -> u32 {
        match self {
            RetryDecision::Retry { retries, .. } | RetryDecision::Fail { retries } => *retries,
        }
    }

    /// Status the job moves to
    pub fn status(&self) -> JobStatus {
        match self {
            RetryDecision::Retry { .. } => JobStatus::Retry,
            RetryDecision::Fail { .. } => JobStatus::Failed,
        }
    }
}

/// Retry policy for jobs.
///
/// `max_retries` counts execution attempts: a task with `max_retries = n`
/// that always fails runs exactly n times (at least once).
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    base_delay: Duration,
    backoff_factor: u32,
}

impl RetryPolicy {
    pub fn new(base_delay: Duration, backoff_factor: u32) -> Self {
        Self {
            base_delay,
            backoff_factor,
        }
    }

    pub fn from_config(config: &JobsConfig) -> Self {
        Self::new(config.retry_base_delay, config.retry_backoff_factor)
    }

    /// Decide the next state from the retries so far and the task limit.
    ///
    /// delay = base_delay * backoff_factor ^ (retries - 1)
    pub fn decide(&self, retries: u32, max_retries: u32) -> RetryDecision {
        let retries = retries.saturating_add(1);
        if retries < max_retries {
            RetryDecision::Retry {
                retries,
                delay: exponential_backoff(self.base_delay, self.backoff_factor, retries - 1),
            }
        } else {
            RetryDecision::Fail { retries }
        }
    }
}

/// `base * factor ^ exponent`, saturating instead of overflowing
pub fn exponential_backoff(base: Duration, factor: u32, exponent: u32) -> Duration {
    if base.is_zero() {
        return Duration::ZERO;
    }
    factor
        .checked_pow(exponent)
        .and_then(|multiplier| base.checked_mul(multiplier))
        .unwrap_or(Duration::MAX)
}

/// `now + delay`, clamped to the latest representable time
pub fn retry_at(now: DateTime<Utc>, delay: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(delay)
        .ok()
        .and_then(|delay| now.checked_add_signed(delay))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
