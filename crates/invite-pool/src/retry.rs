//! Per-token retry budget and backoff

use std::time::Duration;

use crate::error::{Error, Result};
use crate::outcome::Cause;

/// Attempt budget and backoff schedule for one token.
///
/// Rate limits back off linearly (`retry_delay * (attempt + 1)`); every other
/// retryable cause waits a flat `retry_delay`. There is no wait after the
/// final attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_retries: u32,
    retry_delay: Duration,
}

impl RetryPolicy {
    /// `max_retries` is the total number of attempts and must be at least 1.
    pub fn new(max_retries: u32, retry_delay: Duration) -> Result<Self> {
        if max_retries == 0 {
            return Err(Error::InvalidConfig(
                "max_retries must be greater than 0".into(),
            ));
        }
        Ok(Self {
            max_retries,
            retry_delay,
        })
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn retry_delay(&self) -> Duration {
        self.retry_delay
    }

    /// Wait before the attempt after `attempt` (0-based), or `None` if
    /// `attempt` was the last one.
    pub fn next_delay(&self, cause: Cause, attempt: u32) -> Option<Duration> {
        if attempt.saturating_add(1) >= self.max_retries {
            return None;
        }
        Some(match cause {
            Cause::RateLimited => self.retry_delay.saturating_mul(attempt + 1),
            Cause::ServerError | Cause::Transport | Cause::Unexpected => self.retry_delay,
        })
    }
}
