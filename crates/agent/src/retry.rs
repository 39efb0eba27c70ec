//! Bounded backoff for rate-limited model calls.

use std::time::Duration;

/// How many times, and how patiently, to retry a throttled model call.
///
/// `max_retries = 0` reports the throttle immediately.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            base_delay_ms: 1000,
            max_delay_ms: 60_000,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (0-indexed), capped at `max_delay_ms`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay_ms = self.base_delay_ms as f64 * self.backoff_multiplier.powi(attempt as i32);
        Duration::from_millis(delay_ms.min(self.max_delay_ms as f64) as u64)
    }

    /// Honour a server `retry_after` hint when it is longer than our own backoff.
    pub fn delay_with_hint(&self, attempt: u32, retry_after_secs: Option<u64>) -> Duration {
        let ours = self.delay_for_attempt(attempt);
        let cap = Duration::from_millis(self.max_delay_ms);
        match retry_after_secs.map(Duration::from_secs) {
            Some(hint) if hint > ours => hint.min(cap),
            _ => ours,
        }
    }
}
