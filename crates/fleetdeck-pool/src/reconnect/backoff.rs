//! Delay calculation between connect attempts

use std::time::Duration;

use rand::Rng;

use crate::PoolConfig;

/// Retry policy for connect attempts.
///
/// By default the delay between attempts is fixed. A multiplier above 1.0
/// turns it into exponential backoff capped at `max_delay`, and jitter
/// spreads retries of many hosts that failed together.
///
/// # Example
///
/// ```
/// use fleetdeck_pool::reconnect::RetryPolicy;
/// use std::time::Duration;
///
/// let policy = RetryPolicy::fixed(2, Duration::from_millis(100));
/// assert_eq!(policy.max_attempts(), 3);
/// assert_eq!(policy.delay_for(0), Duration::from_millis(100));
/// assert_eq!(policy.delay_for(1), Duration::from_millis(100));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first failed attempt
    max_retries: u32,
    /// Delay before the first retry
    delay: Duration,
    /// Growth factor applied per retry (1.0 = fixed delay)
    multiplier: f64,
    /// Cap for exponential growth
    max_delay: Duration,
    /// Whether to add up to ±25% jitter to each delay
    jitter: bool,
}

impl RetryPolicy {
    /// Create a fixed-delay policy.
    pub fn fixed(max_retries: u32, delay: Duration) -> Self {
        Self {
            max_retries,
            delay,
            multiplier: 1.0,
            max_delay: delay,
            jitter: false,
        }
    }

    /// Create the policy described by a pool configuration.
    pub fn from_config(config: &PoolConfig) -> Self {
        Self::fixed(config.max_retries(), config.retry_delay())
    }

    /// Set the growth factor between retries.
    ///
    /// Values below 1.0 are clamped to 1.0.
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier.max(1.0);
        self
    }

    /// Set the cap for exponential growth.
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay.max(self.delay);
        self
    }

    /// Enable or disable jitter.
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Total attempts one sequence may make.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Retries after the first attempt.
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Delay before the first retry.
    pub fn base_delay(&self) -> Duration {
        self.delay
    }

    /// Growth factor between retries.
    pub fn multiplier(&self) -> f64 {
        self.multiplier
    }

    /// Check if jitter is enabled.
    pub fn has_jitter(&self) -> bool {
        self.jitter
    }

    /// Delay to wait before retry number `retry` (0 = first retry).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let base_ms = self.delay.as_millis() as f64;
        let grown_ms = base_ms * self.multiplier.powi(retry.min(i32::MAX as u32) as i32);
        let cap_ms = self.max_delay.max(self.delay).as_millis() as f64;
        let capped_ms = grown_ms.min(cap_ms) as u64;

        let final_ms = if self.jitter && capped_ms > 0 {
            let spread = capped_ms / 4;
            let offset = rand::thread_rng().gen_range(0..=spread * 2);
            capped_ms.saturating_sub(spread).saturating_add(offset)
        } else {
            capped_ms
        };

        Duration::from_millis(final_ms)
    }
}

impl Default for RetryPolicy {
    /// Default policy: 3 retries, 1 second apart
    fn default() -> Self {
        Self::fixed(3, Duration::from_secs(1))
    }
}
