//! Pool statistics types

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Statistics about one host pool
///
/// Counters only ever grow; `total_connections`, `active_connections`,
/// `idle_connections` and `waiting` are live gauges.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostStats {
    host_id: String,
    total_connections: usize,
    active_connections: usize,
    idle_connections: usize,
    waiting: usize,
    total_borrows: u64,
    total_returns: u64,
    saved_reconnections: u64,
    total_errors: u64,
    total_created: u64,
    total_destroyed: u64,
    acquire_timeouts: u64,
    probe_failures: u64,
}

impl HostStats {
    /// Statistics of a host that has seen no activity
    pub fn empty(host_id: impl Into<String>) -> Self {
        Self {
            host_id: host_id.into(),
            total_connections: 0,
            active_connections: 0,
            idle_connections: 0,
            waiting: 0,
            total_borrows: 0,
            total_returns: 0,
            saved_reconnections: 0,
            total_errors: 0,
            total_created: 0,
            total_destroyed: 0,
            acquire_timeouts: 0,
            probe_failures: 0,
        }
    }

    pub(crate) fn from_parts(host_id: &str, gauges: Gauges, counters: &HostCounters) -> Self {
        Self {
            host_id: host_id.to_string(),
            total_connections: gauges.total,
            active_connections: gauges.active,
            idle_connections: gauges.idle,
            waiting: gauges.waiting,
            total_borrows: counters.borrows.load(Ordering::Relaxed),
            total_returns: counters.returns.load(Ordering::Relaxed),
            saved_reconnections: counters.saved_reconnections.load(Ordering::Relaxed),
            total_errors: counters.errors.load(Ordering::Relaxed),
            total_created: counters.created.load(Ordering::Relaxed),
            total_destroyed: counters.destroyed.load(Ordering::Relaxed),
            acquire_timeouts: counters.acquire_timeouts.load(Ordering::Relaxed),
            probe_failures: counters.probe_failures.load(Ordering::Relaxed),
        }
    }

    /// Host id
    pub fn host_id(&self) -> &str {
        &self.host_id
    }

    /// Connections that exist, including ones still connecting
    pub fn total_connections(&self) -> usize {
        self.total_connections
    }

    /// Connections currently borrowed
    pub fn active_connections(&self) -> usize {
        self.active_connections
    }

    /// Connections parked in the pool
    pub fn idle_connections(&self) -> usize {
        self.idle_connections
    }

    /// Callers queued for a connection
    pub fn waiting(&self) -> usize {
        self.waiting
    }

    /// Acquires that handed out a connection
    pub fn total_borrows(&self) -> u64 {
        self.total_borrows
    }

    /// Healthy releases
    pub fn total_returns(&self) -> u64 {
        self.total_returns
    }

    /// Acquires served by an already-open session instead of a new dial
    pub fn saved_reconnections(&self) -> u64 {
        self.saved_reconnections
    }

    /// Failed connect attempts and failed probes
    pub fn total_errors(&self) -> u64 {
        self.total_errors
    }

    /// Sessions established
    pub fn total_created(&self) -> u64 {
        self.total_created
    }

    /// Sessions closed and removed
    pub fn total_destroyed(&self) -> u64 {
        self.total_destroyed
    }

    /// Acquires that gave up waiting
    pub fn acquire_timeouts(&self) -> u64 {
        self.acquire_timeouts
    }

    /// Failed health-check and keep-alive probes
    pub fn probe_failures(&self) -> u64 {
        self.probe_failures
    }

    /// Share of existing connections currently borrowed (0.0 to 1.0)
    ///
    /// Returns 0.0 if there are no connections.
    pub fn utilization(&self) -> f64 {
        if self.total_connections == 0 {
            0.0
        } else {
            self.active_connections as f64 / self.total_connections as f64
        }
    }

    /// Check if every existing connection is in use
    pub fn is_full(&self) -> bool {
        self.idle_connections == 0 && self.total_connections > 0
    }
}

/// Live gauges read under the host lock
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Gauges {
    pub(crate) total: usize,
    pub(crate) active: usize,
    pub(crate) idle: usize,
    pub(crate) waiting: usize,
}

/// Monotonic per-host counters
#[derive(Debug, Default)]
pub(crate) struct HostCounters {
    pub(crate) borrows: AtomicU64,
    pub(crate) returns: AtomicU64,
    pub(crate) saved_reconnections: AtomicU64,
    pub(crate) errors: AtomicU64,
    pub(crate) created: AtomicU64,
    pub(crate) destroyed: AtomicU64,
    pub(crate) acquire_timeouts: AtomicU64,
    pub(crate) probe_failures: AtomicU64,
}

impl HostCounters {
    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}
