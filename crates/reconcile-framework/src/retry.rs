//! # Retry Policy
//!
//! Decides how long a failed or requeued work item waits before its next attempt, and
//! when to stop retrying. Attempt counts are 1-based: `next_delay(1)` is the wait after
//! the first failure.

use crate::config::DispatcherConfig;
use std::time::Duration;

/// Backoff and give-up rules applied to failed work items.
///
/// Implementations must return non-decreasing delays as `attempt` grows.
pub trait RetryPolicy: Send + Sync + 'static {
    /// Delay before the next attempt, given the number of failures so far.
    fn next_delay(&self, attempt: u32) -> Duration;

    /// `true` once `attempt` failures mean the item should be given up.
    fn should_give_up(&self, attempt: u32) -> bool;

    /// Delay actually applied when a reconciler asks to be called again after
    /// `requested`. Defaults to the requested delay.
    fn requeue_delay(&self, requested: Duration) -> Duration {
        requested
    }
}

/// Capped exponential backoff: `base * 2^(attempt - 1)`, never above `max`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExponentialBackoff {
    base: Duration,
    max: Duration,
    max_attempts: u32,
}

impl ExponentialBackoff {
    pub fn new(base: Duration, max: Duration, max_attempts: u32) -> Self {
        Self {
            base,
            max: max.max(base),
            max_attempts,
        }
    }

    pub fn from_config(config: &DispatcherConfig) -> Self {
        Self::new(
            config.base_retry_delay(),
            config.max_retry_delay(),
            config.max_attempts,
        )
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

impl RetryPolicy for ExponentialBackoff {
    fn next_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let factor = 1u32 << exponent;
        self.base
            .checked_mul(factor)
            .map_or(self.max, |delay| delay.min(self.max))
    }

    fn should_give_up(&self, attempt: u32) -> bool {
        attempt >= self.max_attempts
    }

    /// Requested requeues wait no longer than the retry cap.
    fn requeue_delay(&self, requested: Duration) -> Duration {
        requested.min(self.max)
    }
}
