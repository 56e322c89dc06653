//! Pool configuration types

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{PoolError, PoolResult};

/// Configuration shared by every host pool of a manager
///
/// Controls per-host sizing, timeouts, retry behaviour and the timers run
/// by the shared scheduler. Interval fields set to 0 disable that timer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Maximum number of connections per host, including ones still connecting
    max_connections_per_host: usize,
    /// Number of idle connections the pool tries to keep per warm host
    min_connections_per_host: usize,
    /// Hard ceiling in milliseconds for one connect attempt
    connection_timeout_ms: u64,
    /// Milliseconds of inactivity before an idle connection may be evicted
    idle_timeout_ms: u64,
    /// Interval in milliseconds between keep-alive probes of idle connections
    keep_alive_interval_ms: u64,
    /// Interval in milliseconds between health checks of idle connections
    health_check_interval_ms: u64,
    /// Default time in milliseconds a caller waits for a busy pool
    acquire_timeout_ms: u64,
    /// Retries after the first failed connect attempt
    max_retries: u32,
    /// Delay in milliseconds between connect attempts
    retry_delay_ms: u64,
    /// Timeout in milliseconds for one liveness probe
    probe_timeout_ms: u64,
    /// Interval in milliseconds between idle sweeps
    idle_sweep_interval_ms: u64,
    /// Command run on the remote host as a liveness probe
    probe_command: String,
}

impl PoolConfig {
    /// Create a new pool configuration with the given per-host min and max sizes
    ///
    /// # Panics
    ///
    /// Panics if `min_size > max_size` or if `max_size` is 0.
    pub fn new(min_size: usize, max_size: usize) -> Self {
        assert!(
            max_size > 0,
            "max_size must be greater than 0, got {}",
            max_size
        );
        assert!(
            min_size <= max_size,
            "min_size ({}) cannot exceed max_size ({})",
            min_size,
            max_size
        );

        Self {
            max_connections_per_host: max_size,
            min_connections_per_host: min_size,
            connection_timeout_ms: 10_000,   // 10 seconds
            idle_timeout_ms: 300_000,        // 5 minutes
            keep_alive_interval_ms: 30_000,  // 30 seconds
            health_check_interval_ms: 60_000, // 1 minute
            acquire_timeout_ms: 30_000,      // 30 seconds
            max_retries: 3,
            retry_delay_ms: 1_000,
            probe_timeout_ms: 5_000,
            idle_sweep_interval_ms: 10_000,
            probe_command: "true".to_string(),
        }
    }

    /// Set the connect timeout in milliseconds
    pub fn with_connection_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.connection_timeout_ms = timeout_ms;
        self
    }

    /// Set the idle timeout in milliseconds
    pub fn with_idle_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.idle_timeout_ms = timeout_ms;
        self
    }

    /// Set the keep-alive interval in milliseconds (0 disables keep-alive)
    pub fn with_keep_alive_interval_ms(mut self, interval_ms: u64) -> Self {
        self.keep_alive_interval_ms = interval_ms;
        self
    }

    /// Set the health check interval in milliseconds (0 disables health checks)
    pub fn with_health_check_interval_ms(mut self, interval_ms: u64) -> Self {
        self.health_check_interval_ms = interval_ms;
        self
    }

    /// Set the acquire timeout in milliseconds
    pub fn with_acquire_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.acquire_timeout_ms = timeout_ms;
        self
    }

    /// Set the number of retries after a failed connect attempt
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the delay between connect attempts in milliseconds
    pub fn with_retry_delay_ms(mut self, delay_ms: u64) -> Self {
        self.retry_delay_ms = delay_ms;
        self
    }

    /// Set the liveness probe timeout in milliseconds
    pub fn with_probe_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.probe_timeout_ms = timeout_ms;
        self
    }

    /// Set the idle sweep interval in milliseconds (0 disables the sweep timer)
    pub fn with_idle_sweep_interval_ms(mut self, interval_ms: u64) -> Self {
        self.idle_sweep_interval_ms = interval_ms;
        self
    }

    /// Set the command used as a liveness probe
    pub fn with_probe_command(mut self, command: impl Into<String>) -> Self {
        self.probe_command = command.into();
        self
    }

    /// Check a configuration built by deserialization
    pub fn validate(&self) -> PoolResult<()> {
        if self.max_connections_per_host == 0 {
            return Err(PoolError::InvalidConfig(
                "max_connections_per_host must be greater than 0".to_string(),
            ));
        }

        if self.min_connections_per_host > self.max_connections_per_host {
            return Err(PoolError::InvalidConfig(format!(
                "min_connections_per_host ({}) cannot exceed max_connections_per_host ({})",
                self.min_connections_per_host, self.max_connections_per_host
            )));
        }

        if self.connection_timeout_ms == 0 {
            return Err(PoolError::InvalidConfig(
                "connection_timeout_ms must be greater than 0".to_string(),
            ));
        }

        if self.probe_timeout_ms == 0 {
            return Err(PoolError::InvalidConfig(
                "probe_timeout_ms must be greater than 0".to_string(),
            ));
        }

        if self.probe_command.trim().is_empty() {
            return Err(PoolError::InvalidConfig(
                "probe_command cannot be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Get the maximum connections per host
    pub fn max_connections_per_host(&self) -> usize {
        self.max_connections_per_host
    }

    /// Get the minimum connections per host
    pub fn min_connections_per_host(&self) -> usize {
        self.min_connections_per_host
    }

    /// Get the connect timeout as a Duration
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_millis(self.connection_timeout_ms)
    }

    /// Get the idle timeout as a Duration
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    /// Get the keep-alive interval if enabled
    pub fn keep_alive_interval(&self) -> Option<Duration> {
        non_zero_millis(self.keep_alive_interval_ms)
    }

    /// Get the health check interval if enabled
    pub fn health_check_interval(&self) -> Option<Duration> {
        non_zero_millis(self.health_check_interval_ms)
    }

    /// Get the idle sweep interval if enabled
    pub fn idle_sweep_interval(&self) -> Option<Duration> {
        non_zero_millis(self.idle_sweep_interval_ms)
    }

    /// Get the default acquire timeout as a Duration
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }

    /// Get the number of retries after the first connect attempt
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Get the delay between connect attempts
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Get the liveness probe timeout
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    /// Get the liveness probe command
    pub fn probe_command(&self) -> &str {
        &self.probe_command
    }
}

fn non_zero_millis(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}

impl Default for PoolConfig {
    /// Create a default pool configuration
    ///
    /// Defaults:
    /// - min_connections_per_host: 1
    /// - max_connections_per_host: 4
    /// - connection_timeout: 10 seconds
    /// - idle_timeout: 5 minutes
    /// - keep_alive_interval: 30 seconds
    /// - health_check_interval: 1 minute
    /// - acquire_timeout: 30 seconds
    /// - max_retries: 3, retry_delay: 1 second
    fn default() -> Self {
        Self::new(1, 4)
    }
}

#[cfg(test)]
mod tests;
