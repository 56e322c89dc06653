//! Forwards pool lifecycle events to the log

use fleetdeck_pool::PoolEvent;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;

/// Log every event until the channel closes or the task is aborted
pub fn spawn_event_logger(mut events: broadcast::Receiver<PoolEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => log_event(&event),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "event logger fell behind");
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

fn log_event(event: &PoolEvent) {
    let name = event.name();
    match event {
        PoolEvent::ConnectionCreated {
            host_id,
            connection_id,
        } => {
            tracing::debug!(event = name, host = %host_id, connection = %connection_id, "connection created");
        }
        PoolEvent::ConnectionDestroyed {
            host_id,
            connection_id,
            reason,
        } => {
            tracing::debug!(event = name, host = %host_id, connection = %connection_id, %reason, "connection destroyed");
        }
        PoolEvent::ConnectAttemptFailed {
            host_id,
            attempt,
            max_attempts,
            error,
        } => {
            tracing::info!(event = name, host = %host_id, attempt, max_attempts, %error, "connect attempt failed");
        }
        PoolEvent::HostUnhealthy { host_id, error } => {
            tracing::warn!(event = name, host = %host_id, %error, "host unhealthy");
        }
    }
}
