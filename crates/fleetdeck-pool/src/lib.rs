//! Fleetdeck Pool - Per-host pooling of remote command sessions
//!
//! This crate keeps a bounded set of persistent sessions per registered host
//! and shares them safely between many concurrent callers. It handles:
//!
//! - Lazy, bounded connection creation with FIFO waiters and acquire timeouts
//! - Retry with backoff when a host refuses or drops the handshake
//! - Idle eviction, keep-alive probes and periodic health checks
//! - Per-host statistics and lifecycle events for observers
//!
//! # Example
//!
//! ```ignore
//! use fleetdeck_pool::{ConnectionPoolManager, PoolConfig};
//!
//! let manager = ConnectionPoolManager::new(PoolConfig::default(), transport);
//! manager.register_host(host)?;
//!
//! let conn = manager.acquire("alpha").await?;
//! let output = conn.exec("nvidia-smi -L").await?;
//! conn.release();
//! ```

mod config;
mod error;
mod events;
pub mod health;
mod manager;
pub mod pool;
pub mod reconnect;

#[cfg(test)]
mod test_support;

pub use config::PoolConfig;
pub use error::{PoolError, PoolResult};
pub use events::{DestroyReason, PoolEvent};
pub use health::{HealthStatus, HealthThresholds, PingError, PingResult, ping_session};
pub use manager::{ConnectionPoolManager, HostStatus, PoolStatus};
pub use pool::{ConnectionId, ConnectionState, HostStats, PooledConnection};
pub use reconnect::{RetryExhausted, RetryPolicy, retry_with_backoff};
