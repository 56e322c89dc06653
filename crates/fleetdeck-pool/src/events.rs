//! Lifecycle events for loosely-coupled observers
//!
//! The manager publishes events on a broadcast channel; metrics and logging
//! collaborators subscribe without the pool depending on them.

use std::fmt;

use serde::Serialize;
use tokio::sync::broadcast;

use crate::pool::ConnectionId;

/// Why a connection was destroyed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DestroyReason {
    /// The borrowing caller released it as unhealthy
    ReleasedUnhealthy,
    /// The transport reported the session closed
    TransportClosed,
    /// A periodic health check failed
    HealthCheckFailed,
    /// A keep-alive probe failed
    KeepAliveFailed,
    /// Idle longer than the idle timeout
    IdleTimeout,
    /// The pool shut down
    Shutdown,
    /// The host was unregistered
    HostRemoved,
}

impl fmt::Display for DestroyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            DestroyReason::ReleasedUnhealthy => "released unhealthy",
            DestroyReason::TransportClosed => "transport closed",
            DestroyReason::HealthCheckFailed => "health check failed",
            DestroyReason::KeepAliveFailed => "keep-alive failed",
            DestroyReason::IdleTimeout => "idle timeout",
            DestroyReason::Shutdown => "shutdown",
            DestroyReason::HostRemoved => "host removed",
        };
        f.write_str(label)
    }
}

/// Pool lifecycle event
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PoolEvent {
    /// A new session was established
    ConnectionCreated {
        host_id: String,
        connection_id: ConnectionId,
    },
    /// A connection was closed and removed from its host pool
    ConnectionDestroyed {
        host_id: String,
        connection_id: ConnectionId,
        reason: DestroyReason,
    },
    /// One connect attempt of a retry sequence failed
    ConnectAttemptFailed {
        host_id: String,
        attempt: u32,
        max_attempts: u32,
        error: String,
    },
    /// A host exhausted its retries or failed a probe
    HostUnhealthy { host_id: String, error: String },
}

impl PoolEvent {
    /// Event name in `subject:verb` form
    pub fn name(&self) -> &'static str {
        match self {
            PoolEvent::ConnectionCreated { .. } => "connection:created",
            PoolEvent::ConnectionDestroyed { .. } => "connection:destroyed",
            PoolEvent::ConnectAttemptFailed { .. } => "connection:attempt_failed",
            PoolEvent::HostUnhealthy { .. } => "host:unhealthy",
        }
    }

    /// Host the event concerns
    pub fn host_id(&self) -> &str {
        match self {
            PoolEvent::ConnectionCreated { host_id, .. }
            | PoolEvent::ConnectionDestroyed { host_id, .. }
            | PoolEvent::ConnectAttemptFailed { host_id, .. }
            | PoolEvent::HostUnhealthy { host_id, .. } => host_id,
        }
    }
}

/// Broadcast fan-out of pool events
#[derive(Debug, Clone)]
pub(crate) struct EventBus {
    sender: broadcast::Sender<PoolEvent>,
}

impl EventBus {
    pub(crate) fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<PoolEvent> {
        self.sender.subscribe()
    }

    pub(crate) fn emit(&self, event: PoolEvent) {
        tracing::trace!(event = event.name(), host_id = event.host_id(), "pool event");
        // No subscribers is fine
        let _ = self.sender.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_names() {
        let created = PoolEvent::ConnectionCreated {
            host_id: "alpha".into(),
            connection_id: ConnectionId::from_raw(1),
        };
        assert_eq!(created.name(), "connection:created");
        assert_eq!(created.host_id(), "alpha");

        let destroyed = PoolEvent::ConnectionDestroyed {
            host_id: "alpha".into(),
            connection_id: ConnectionId::from_raw(1),
            reason: DestroyReason::IdleTimeout,
        };
        assert_eq!(destroyed.name(), "connection:destroyed");
    }

    #[test]
    fn test_event_serialization() {
        let event = PoolEvent::ConnectionDestroyed {
            host_id: "alpha".into(),
            connection_id: ConnectionId::from_raw(7),
            reason: DestroyReason::KeepAliveFailed,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "connection_destroyed");
        assert_eq!(json["connection_id"], 7);
        assert_eq!(json["reason"], "keep_alive_failed");
    }

    #[tokio::test]
    async fn test_event_bus_fan_out() {
        let bus = EventBus::new(8);
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();

        bus.emit(PoolEvent::HostUnhealthy {
            host_id: "beta".into(),
            error: "refused".into(),
        });

        assert_eq!(first.recv().await.unwrap().host_id(), "beta");
        assert_eq!(second.recv().await.unwrap().name(), "host:unhealthy");
    }

    #[test]
    fn test_emit_without_subscribers() {
        let bus = EventBus::new(1);
        bus.emit(PoolEvent::HostUnhealthy {
            host_id: "beta".into(),
            error: "refused".into(),
        });
    }
}
