//! Pooled connection types

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use fleetdeck_core::{CommandOutput, Session};
use serde::Serialize;
use tokio::time::Instant;

use super::host_pool::HostPool;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Identifier of one pooled connection, unique within the process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub(crate) fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Wrap a raw id
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw numeric id
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Lifecycle state of a pooled connection
///
/// `Connecting -> Idle -> Active -> Idle ... | Unhealthy -> Closing -> Closed`
///
/// An idle connection moves to `Probing` while a keep-alive or health probe
/// runs on it and back to `Idle` when the probe passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Connecting,
    Idle,
    Probing,
    Active,
    Unhealthy,
    Closing,
    Closed,
}

/// A session plus the bookkeeping that travels with it
pub(crate) struct PooledSession {
    pub(crate) id: ConnectionId,
    pub(crate) session: Arc<dyn Session>,
    pub(crate) created_at: Instant,
    pub(crate) last_used_at: Instant,
    pub(crate) last_probed_at: Option<Instant>,
    pub(crate) use_count: u64,
}

impl PooledSession {
    pub(crate) fn new(id: ConnectionId, session: Arc<dyn Session>) -> Self {
        let now = Instant::now();
        Self {
            id,
            session,
            created_at: now,
            last_used_at: now,
            last_probed_at: None,
            use_count: 0,
        }
    }

    pub(crate) fn touch(&mut self) {
        self.last_used_at = Instant::now();
    }

    /// Mark the start of a borrow
    pub(crate) fn checkout(&mut self) {
        self.touch();
        self.use_count += 1;
    }

    /// Most recent use or successful probe
    pub(crate) fn last_activity(&self) -> Instant {
        match self.last_probed_at {
            Some(probed) if probed > self.last_used_at => probed,
            _ => self.last_used_at,
        }
    }
}

/// A connection borrowed from a host pool
///
/// The borrowing caller owns the session until `release` is called. A
/// connection that is dropped without being released is returned to the
/// pool as if `release()` had been called.
pub struct PooledConnection {
    inner: Option<PooledSession>,
    pool: Arc<HostPool>,
}

impl PooledConnection {
    pub(crate) fn new(inner: PooledSession, pool: Arc<HostPool>) -> Self {
        Self {
            inner: Some(inner),
            pool,
        }
    }

    fn inner(&self) -> &PooledSession {
        self.inner.as_ref().expect("connection already released")
    }

    /// Connection id
    pub fn id(&self) -> ConnectionId {
        self.inner().id
    }

    /// Host this connection belongs to
    pub fn host_id(&self) -> &str {
        self.pool.host_id()
    }

    /// When the session was established
    pub fn created_at(&self) -> Instant {
        self.inner().created_at
    }

    /// When the connection was last borrowed or returned
    pub fn last_used_at(&self) -> Instant {
        self.inner().last_used_at
    }

    /// Number of times the connection has been borrowed, this borrow included
    pub fn use_count(&self) -> u64 {
        self.inner().use_count
    }

    /// The underlying session
    pub fn session(&self) -> &dyn Session {
        self.inner().session.as_ref()
    }

    /// Run a command on the borrowed session
    ///
    /// Does not touch pool bookkeeping; the caller still has to release.
    pub async fn exec(&self, command: &str) -> fleetdeck_core::Result<CommandOutput> {
        self.session().exec(command).await
    }

    /// Whether the transport reports the session closed
    pub fn is_closed(&self) -> bool {
        self.session().is_closed()
    }

    /// Return the connection to its pool
    pub fn release(mut self) {
        if let Some(inner) = self.inner.take() {
            self.pool.release_session(inner, false);
        }
    }

    /// Return the connection as unhealthy; the pool closes and replaces it
    pub fn release_unhealthy(mut self) {
        if let Some(inner) = self.inner.take() {
            self.pool.release_session(inner, true);
        }
    }
}

impl fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("PooledConnection");
        debug.field("host_id", &self.pool.host_id());
        if let Some(inner) = &self.inner {
            debug
                .field("id", &inner.id)
                .field("use_count", &inner.use_count);
        }
        debug.finish_non_exhaustive()
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.take() {
            self.pool.release_session(inner, false);
        }
    }
}
