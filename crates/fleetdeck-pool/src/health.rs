//! Liveness probing for pooled sessions
//!
//! This module provides the probe run against idle connections by the
//! health checker and keep-alive timers, latency classification, and the
//! per-host health record behind `HostStatus::healthy`.
//!
//! # Example
//!
//! ```ignore
//! use fleetdeck_pool::health::{ping_session, HealthStatus};
//!
//! let latency = ping_session(&*session, "true", Duration::from_secs(5)).await?;
//! let status = HealthStatus::from_latency(latency);
//! ```

mod checker;
mod ping;
mod status;


pub use checker::HostHealth;
pub(crate) use checker::ProbeKind;
pub use ping::{PingError, PingResult, ping_session};
pub use status::{HealthStatus, HealthThresholds};
