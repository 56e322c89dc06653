//! Probe outcome classification
//!
//! A probe runs the configured command (normally `true`) on an idle session
//! and times the round trip. The round trip covers the remote shell spawn as
//! well as the network, so a loaded GPU node answers slower than an idle one
//! even on a quiet link.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::ping::PingResult;

/// How a host or session answered its last probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    /// The probe command came back quickly
    #[default]
    Healthy,
    /// The probe command came back, but slowly
    Degraded,
    /// The probe failed, timed out, or took longer than the degraded bound
    Unhealthy,
}

impl HealthStatus {
    /// Classify a probe round trip with the default thresholds.
    ///
    /// A round trip of up to 100ms is healthy and up to 500ms degraded.
    ///
    /// # Example
    ///
    /// ```
    /// use fleetdeck_pool::health::HealthStatus;
    /// use std::time::Duration;
    ///
    /// // `true` answered over a LAN hop
    /// let status = HealthStatus::from_latency(Duration::from_millis(12));
    /// assert_eq!(status, HealthStatus::Healthy);
    ///
    /// // same command on a node busy with a training job
    /// let status = HealthStatus::from_latency(Duration::from_millis(320));
    /// assert_eq!(status, HealthStatus::Degraded);
    /// ```
    pub fn from_latency(latency: Duration) -> Self {
        HealthThresholds::default().classify(latency)
    }

    /// Classify a probe round trip with custom thresholds.
    pub fn from_latency_with_thresholds(latency: Duration, thresholds: &HealthThresholds) -> Self {
        thresholds.classify(latency)
    }

    /// Classify a finished probe; any probe error is `Unhealthy`.
    pub fn from_probe(result: &PingResult, thresholds: &HealthThresholds) -> Self {
        match result {
            Ok(latency) => thresholds.classify(*latency),
            Err(_) => HealthStatus::Unhealthy,
        }
    }

    /// A degraded session still runs commands; only `Unhealthy` is unusable.
    pub fn is_usable(&self) -> bool {
        matches!(self, HealthStatus::Healthy | HealthStatus::Degraded)
    }

    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Healthy)
    }
}

/// Round-trip bounds for probe classification
#[derive(Debug, Clone)]
pub struct HealthThresholds {
    /// Slowest round trip still reported healthy
    pub healthy_threshold: Duration,
    /// Slowest round trip still reported degraded
    pub degraded_threshold: Duration,
}

impl HealthThresholds {
    /// Bounds in milliseconds; the degraded bound is raised to the healthy one if lower.
    pub fn new(healthy_ms: u64, degraded_ms: u64) -> Self {
        Self {
            healthy_threshold: Duration::from_millis(healthy_ms),
            degraded_threshold: Duration::from_millis(degraded_ms.max(healthy_ms)),
        }
    }

    /// Classify one probe round trip. Both bounds are inclusive.
    pub fn classify(&self, round_trip: Duration) -> HealthStatus {
        if round_trip <= self.healthy_threshold {
            HealthStatus::Healthy
        } else if round_trip <= self.degraded_threshold {
            HealthStatus::Degraded
        } else {
            HealthStatus::Unhealthy
        }
    }
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self::new(100, 500)
    }
}
