//! Retry budget and backoff schedule shared by API calls and file transfers

use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use serde::{Deserialize, Serialize};

use crate::constants::limits;

/// Bounded retry policy with exponential backoff
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    /// Delay before the first retry; doubles afterwards
    #[serde(with = "humantime_serde")]
    pub base_delay: Duration,
    /// Upper bound for a single backoff delay
    #[serde(with = "humantime_serde")]
    pub max_delay: Duration,
    /// Longest server-requested Retry-After we will sleep through
    #[serde(with = "humantime_serde")]
    pub max_retry_after: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: limits::MAX_ATTEMPTS,
            base_delay: Duration::from_millis(limits::RETRY_BASE_DELAY_MS),
            max_delay: Duration::from_secs(limits::MAX_BACKOFF_SECS),
            max_retry_after: Duration::from_secs(limits::MAX_RETRY_AFTER_SECS),
        }
    }
}

impl RetryPolicy {
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    pub fn with_max_retry_after(mut self, max_retry_after: Duration) -> Self {
        self.max_retry_after = max_retry_after;
        self
    }

    /// Fresh backoff schedule for one operation
    pub fn schedule(&self) -> RetrySchedule {
        let backoff = ExponentialBackoffBuilder::new()
            .with_initial_interval(self.base_delay)
            .with_multiplier(2.0)
            .with_randomization_factor(limits::BACKOFF_JITTER_FACTOR)
            .with_max_interval(self.max_delay)
            .with_max_elapsed_time(None)
            .build();

        RetrySchedule {
            backoff,
            attempts: 0,
            max_attempts: self.max_attempts.max(1),
            max_delay: self.max_delay,
        }
    }
}

/// Attempt counter plus the next backoff delay for one operation
#[derive(Debug)]
pub struct RetrySchedule {
    backoff: ExponentialBackoff,
    attempts: u32,
    max_attempts: u32,
    max_delay: Duration,
}

impl RetrySchedule {
    /// Count an attempt that is about to be made
    pub fn start_attempt(&mut self) -> u32 {
        self.attempts += 1;
        self.attempts
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Whether another attempt fits in the budget
    pub fn can_retry(&self) -> bool {
        self.attempts < self.max_attempts
    }

    /// Delay before the next attempt
    pub fn next_delay(&mut self) -> Duration {
        self.backoff.next_backoff().unwrap_or(self.max_delay)
    }
}

/// Parse a Retry-After header given in seconds or as an HTTP date
pub fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();

    if let Ok(seconds) = value.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }

    let at = DateTime::parse_from_rfc2822(value).ok()?.with_timezone(&Utc);
    Some(
        at.signed_duration_since(Utc::now())
            .to_std()
            .unwrap_or(Duration::ZERO),
    )
}
