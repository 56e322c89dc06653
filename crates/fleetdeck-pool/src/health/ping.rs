//! Session ping implementation
//!
//! Runs a trivial remote command and measures the round trip.

use std::time::Duration;

use fleetdeck_core::Session;
use thiserror::Error;
use tokio::time::Instant;

/// Result of a ping operation
pub type PingResult = Result<Duration, PingError>;

/// Error that can occur during a ping
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PingError {
    /// The transport already reports the session closed
    #[error("Session is closed")]
    ConnectionClosed,
    /// The probe command could not be run
    #[error("Probe command failed: {0}")]
    CommandFailed(String),
    /// The probe command ran but exited non-zero
    #[error("Probe command exited with status {0}")]
    NonZeroExit(i32),
    /// The probe did not finish in time
    #[error("Probe timed out after {0:?}")]
    Timeout(Duration),
}

/// Ping a session to check that it is alive.
///
/// Executes `command` (normally `true`) bounded by `timeout` and returns the
/// round-trip time.
///
/// # Example
///
/// ```ignore
/// let latency = ping_session(&*session, "true", Duration::from_secs(5)).await?;
/// ```
pub async fn ping_session(session: &dyn Session, command: &str, timeout: Duration) -> PingResult {
    if session.is_closed() {
        return Err(PingError::ConnectionClosed);
    }

    let start = Instant::now();

    match tokio::time::timeout(timeout, session.exec(command)).await {
        Ok(Ok(output)) if output.success() => Ok(start.elapsed()),
        Ok(Ok(output)) => Err(PingError::NonZeroExit(output.exit_status)),
        Ok(Err(e)) => Err(PingError::CommandFailed(e.to_string())),
        Err(_) => Err(PingError::Timeout(timeout)),
    }
}
