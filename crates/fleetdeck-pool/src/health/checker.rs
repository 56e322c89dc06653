//! Per-host health tracking
//!
//! Records probe and connect outcomes for one host so the manager can
//! report whether the host is healthy without dialing it.

use std::time::Duration;

use tokio::time::Instant;

use super::status::{HealthStatus, HealthThresholds};
use crate::{DestroyReason, PoolError};

/// Which timer issued a probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ProbeKind {
    HealthCheck,
    KeepAlive,
}

impl ProbeKind {
    pub(crate) fn destroy_reason(self) -> DestroyReason {
        match self {
            ProbeKind::HealthCheck => DestroyReason::HealthCheckFailed,
            ProbeKind::KeepAlive => DestroyReason::KeepAliveFailed,
        }
    }

    pub(crate) fn failure(self, message: String) -> PoolError {
        match self {
            ProbeKind::HealthCheck => PoolError::HealthCheckFailed(message),
            ProbeKind::KeepAlive => PoolError::KeepAliveFailed(message),
        }
    }
}

/// Health record for one host
#[derive(Debug, Clone)]
pub struct HostHealth {
    thresholds: HealthThresholds,
    last_status: HealthStatus,
    last_latency: Option<Duration>,
    last_checked_at: Option<Instant>,
    consecutive_failures: u32,
    last_error: Option<String>,
}

impl HostHealth {
    /// Create a health record that classifies latency with `thresholds`.
    pub fn new(thresholds: HealthThresholds) -> Self {
        Self {
            thresholds,
            last_status: HealthStatus::Healthy,
            last_latency: None,
            last_checked_at: None,
            consecutive_failures: 0,
            last_error: None,
        }
    }

    /// Record a successful probe.
    pub fn record_success(&mut self, latency: Duration) {
        self.last_status = self.thresholds.classify(latency);
        self.last_latency = Some(latency);
        self.last_checked_at = Some(Instant::now());
        self.consecutive_failures = 0;
    }

    /// Record a failed probe or connect sequence.
    ///
    /// Returns the number of consecutive failures including this one.
    pub fn record_failure(&mut self, error: impl Into<String>) -> u32 {
        self.last_status = HealthStatus::Unhealthy;
        self.last_latency = None;
        self.last_checked_at = Some(Instant::now());
        self.last_error = Some(error.into());
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.consecutive_failures
    }

    /// Record that a session to the host was established.
    pub fn record_connected(&mut self) {
        self.consecutive_failures = 0;
        if self.last_status == HealthStatus::Unhealthy {
            self.last_status = HealthStatus::Healthy;
        }
    }

    /// Last classified status.
    pub fn status(&self) -> HealthStatus {
        self.last_status
    }

    /// Latency of the last successful probe.
    pub fn last_latency(&self) -> Option<Duration> {
        self.last_latency
    }

    /// When the host was last probed or failed.
    pub fn last_checked_at(&self) -> Option<Instant> {
        self.last_checked_at
    }

    /// Number of failures since the last success.
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Message of the most recent failure.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Healthy when nothing has failed since the last success and latency is usable.
    pub fn is_healthy(&self) -> bool {
        self.consecutive_failures == 0 && self.last_status.is_usable()
    }
}

impl Default for HostHealth {
    fn default() -> Self {
        Self::new(HealthThresholds::default())
    }
}
