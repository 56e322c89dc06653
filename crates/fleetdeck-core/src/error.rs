//! Error types for Fleetdeck

use thiserror::Error;

/// Core error type for transport and session operations
#[derive(Error, Debug)]
pub enum FleetError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Command error: {0}")]
    Command(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Session closed")]
    SessionClosed,

    #[error("{0}")]
    Other(String),
}

impl FleetError {
    /// Whether this error means the underlying session can no longer be used.
    ///
    /// Callers holding a pooled connection use this to decide whether to
    /// hand it back as unhealthy instead of returning it to the idle set.
    pub fn is_connection_lost(&self) -> bool {
        matches!(
            self,
            FleetError::Connection(_)
                | FleetError::Io(_)
                | FleetError::Timeout(_)
                | FleetError::SessionClosed
        )
    }
}

/// Result type alias for Fleetdeck operations
pub type Result<T> = std::result::Result<T, FleetError>;
