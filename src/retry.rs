//! Retry policy for transfers and the backoff schedule for verification.

use std::time::Duration;

/// Exponential backoff between verification lookups.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Backoff {
    /// Delay after the first unsuccessful lookup.
    pub base_delay: Duration,
    /// Growth factor per attempt; values below 1 are treated as 1.
    pub multiplier: f64,
    /// Upper bound for a single delay.
    pub max_delay: Duration,
    /// Total number of lookups, including the first.
    pub max_attempts: u32,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(2),
            multiplier: 2.0,
            max_delay: Duration::from_secs(30),
            max_attempts: 6,
        }
    }
}

impl Backoff {
    pub const fn new(base_delay: Duration, max_attempts: u32) -> Self {
        Self {
            base_delay,
            multiplier: 2.0,
            max_delay: Duration::from_secs(60),
            max_attempts,
        }
    }

    #[must_use]
    pub const fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Delay to wait after lookup number `attempt` (0-based) failed, or
    /// `None` when that was the last lookup.
    pub fn delay_for_attempt(&self, attempt: u32) -> Option<Duration> {
        if attempt.saturating_add(1) >= self.max_attempts {
            return None;
        }
        let multiplier = self.multiplier.max(1.0);
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let secs = self.base_delay.as_secs_f64() * multiplier.powi(exponent);
        let delay = if secs.is_finite() && secs < self.max_delay.as_secs_f64() {
            Duration::from_secs_f64(secs)
        } else {
            self.max_delay
        };
        Some(delay.min(self.max_delay))
    }

    /// Every delay the schedule will wait, in order.
    pub fn delays(&self) -> impl Iterator<Item = Duration> + '_ {
        (0..).map_while(|attempt| self.delay_for_attempt(attempt))
    }

    /// Upper bound on the time spent sleeping across all attempts.
    pub fn total_delay(&self) -> Duration {
        self.delays().sum()
    }
}

/// How often to retry a transfer and how patiently to verify it.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum send attempts for a request that keeps failing with
    /// insufficient funds, counting the first attempt. Other failures are
    /// never retried.
    pub max_funds_retries: u32,
    /// Pause before re-sending a deferred request when nothing else is
    /// queued ahead of it.
    pub funds_settle_delay: Duration,
    pub verification: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_funds_retries: 3,
            funds_settle_delay: Duration::from_secs(3),
            verification: Backoff::default(),
        }
    }
}

impl RetryPolicy {
    /// Whether a request that has been attempted `attempts` times may be sent again.
    pub fn may_retry_funds(&self, attempts: u32) -> bool {
        attempts < self.max_funds_retries
    }
}
