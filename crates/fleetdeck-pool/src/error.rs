//! Error types for pool operations

use std::time::Duration;

use fleetdeck_core::FleetError;
use thiserror::Error;

/// Errors surfaced by the connection pool
///
/// Host-level failures are always reported to the immediate caller and never
/// affect other hosts or other callers' in-flight operations.
#[derive(Error, Debug)]
pub enum PoolError {
    /// Operation referenced a host id that was never registered
    #[error("Unknown host: {0}")]
    UnknownHost(String),

    /// Every connect attempt of one retry sequence failed
    #[error("Failed to connect to host '{host_id}' after {attempts} attempt(s): {last_error}")]
    ConnectFailed {
        host_id: String,
        attempts: u32,
        #[source]
        last_error: FleetError,
    },

    /// The pool was at capacity and no connection freed up in time
    #[error("Timed out after {timeout:?} waiting for a connection to host '{host_id}'")]
    AcquireTimeout { host_id: String, timeout: Duration },

    /// A periodic liveness probe failed (internal, resolved by the pool)
    #[error("Health check failed: {0}")]
    HealthCheckFailed(String),

    /// A keep-alive probe failed (internal, resolved by the pool)
    #[error("Keep-alive failed: {0}")]
    KeepAliveFailed(String),

    /// The request raced with or arrived after `shutdown()`
    #[error("Connection pool is shutting down")]
    PoolShuttingDown,

    /// Pool configuration is unusable
    #[error("Invalid pool configuration: {0}")]
    InvalidConfig(String),

    /// Host configuration was rejected at registration
    #[error("Invalid host configuration: {0}")]
    InvalidHost(#[source] FleetError),

    /// A command on a borrowed session failed
    #[error(transparent)]
    Session(#[from] FleetError),
}

impl PoolError {
    /// Whether the error is backpressure rather than a fault
    pub fn is_timeout(&self) -> bool {
        matches!(self, PoolError::AcquireTimeout { .. })
    }
}

/// Result type alias for pool operations
pub type PoolResult<T> = std::result::Result<T, PoolError>;
