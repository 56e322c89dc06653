//! Error types for SSH transport operations

use fleetdeck_core::FleetError;

/// Error types for SSH transport operations
#[derive(Debug, thiserror::Error)]
pub enum SshTransportError {
    /// Host name did not resolve to any address
    #[error("Failed to resolve {address}: {source}")]
    ResolveFailed {
        address: String,
        source: std::io::Error,
    },

    /// Failed to connect to SSH server
    #[error("Failed to connect to SSH server {address}: {source}")]
    ConnectionFailed {
        address: String,
        source: std::io::Error,
    },

    /// SSH handshake failed
    #[error("SSH handshake with {address} failed: {message}")]
    HandshakeFailed { address: String, message: String },

    /// Authentication failed
    #[error("SSH authentication failed: {0}")]
    AuthenticationFailed(String),

    /// SSH agent not available
    #[error("SSH agent not available: {0}")]
    AgentNotAvailable(String),

    /// Private key file not found
    #[error("Private key file not found: {path}")]
    PrivateKeyNotFound { path: String },

    /// Invalid private key format
    #[error("Invalid private key format: {0}")]
    InvalidPrivateKey(String),

    /// Opening or driving an exec channel failed
    #[error("SSH channel error: {0}")]
    Channel(String),

    /// Command produced no end of output before the command timeout
    #[error("SSH command did not finish within {0:?}")]
    CommandTimedOut(std::time::Duration),

    /// Session is closed
    #[error("SSH session is closed")]
    SessionClosed,

    /// Blocking worker panicked or was cancelled
    #[error("SSH worker failed: {0}")]
    Worker(String),
}

impl From<SshTransportError> for FleetError {
    fn from(err: SshTransportError) -> Self {
        match err {
            SshTransportError::SessionClosed => FleetError::SessionClosed,
            SshTransportError::AuthenticationFailed(_)
            | SshTransportError::AgentNotAvailable(_)
            | SshTransportError::PrivateKeyNotFound { .. }
            | SshTransportError::InvalidPrivateKey(_) => FleetError::Authentication(err.to_string()),
            SshTransportError::ResolveFailed { .. }
            | SshTransportError::ConnectionFailed { .. }
            | SshTransportError::HandshakeFailed { .. }
            | SshTransportError::Channel(_) => FleetError::Connection(err.to_string()),
            SshTransportError::CommandTimedOut(_) => FleetError::Timeout(err.to_string()),
            SshTransportError::Worker(_) => FleetError::Other(err.to_string()),
        }
    }
}
