//! Per-host connection pooling
//!
//! This module holds the host pool that serves acquire/release for one host,
//! the `PooledConnection` handed to callers, and per-host statistics.
//!
//! # Example
//!
//! ```ignore
//! let conn = manager.acquire("alpha").await?;
//! let output = conn.exec("df -h /data").await?;
//! // Returned to the pool on release (or when dropped)
//! conn.release();
//! ```

mod connection;
mod host_pool;
mod stats;

#[cfg(test)]
mod tests;

pub use connection::{ConnectionId, ConnectionState, PooledConnection};
pub(crate) use host_pool::{HostPool, PoolContext};
pub use stats::HostStats;
