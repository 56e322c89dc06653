//! Host Configuration Types
//!
//! Defines how a compute host is addressed and authenticated. A `HostConfig`
//! is immutable once registered with a pool; re-registering the same id
//! replaces the configuration used for future connections.

use crate::{FleetError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Default SSH port
pub const DEFAULT_PORT: u16 = 22;

/// Authentication method for a host
#[derive(Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostAuth {
    /// Authenticate using a password
    Password {
        /// The password for authentication
        password: String,
    },
    /// Authenticate using a private key file
    PrivateKey {
        /// Path to the private key file
        path: PathBuf,
        /// Optional passphrase for encrypted private keys
        #[serde(default)]
        passphrase: Option<String>,
    },
    /// Use the system SSH agent for authentication
    Agent,
}

impl HostAuth {
    /// Create a password authentication method
    pub fn password(password: impl Into<String>) -> Self {
        Self::Password {
            password: password.into(),
        }
    }

    /// Create a private key authentication method
    pub fn private_key(path: impl Into<PathBuf>) -> Self {
        Self::PrivateKey {
            path: path.into(),
            passphrase: None,
        }
    }

    /// Create a private key authentication method with a passphrase
    pub fn private_key_with_passphrase(
        path: impl Into<PathBuf>,
        passphrase: impl Into<String>,
    ) -> Self {
        Self::PrivateKey {
            path: path.into(),
            passphrase: Some(passphrase.into()),
        }
    }

    /// Create an SSH agent authentication method
    pub fn agent() -> Self {
        Self::Agent
    }

    /// Short label for logs, never containing secret material
    pub fn kind(&self) -> &'static str {
        match self {
            HostAuth::Password { .. } => "password",
            HostAuth::PrivateKey { .. } => "private_key",
            HostAuth::Agent => "agent",
        }
    }
}

// Secrets stay out of logs and panic messages.
impl fmt::Debug for HostAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostAuth::Password { .. } => f
                .debug_struct("Password")
                .field("password", &"<redacted>")
                .finish(),
            HostAuth::PrivateKey { path, passphrase } => f
                .debug_struct("PrivateKey")
                .field("path", path)
                .field("passphrase", &passphrase.as_ref().map(|_| "<redacted>"))
                .finish(),
            HostAuth::Agent => f.write_str("Agent"),
        }
    }
}

/// Configuration for reaching one compute host
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HostConfig {
    /// Stable unique identifier used to route pool operations
    pub id: String,
    /// Display name
    #[serde(default)]
    pub name: String,
    /// Hostname or IP address
    pub host: String,
    /// SSH port (default: 22)
    #[serde(default = "default_port")]
    pub port: u16,
    /// Username for authentication
    pub username: String,
    /// Authentication method
    pub auth: HostAuth,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

impl HostConfig {
    /// Create a host configuration with an explicit authentication method
    pub fn new(
        id: impl Into<String>,
        host: impl Into<String>,
        username: impl Into<String>,
        auth: HostAuth,
    ) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            host: host.into(),
            port: DEFAULT_PORT,
            username: username.into(),
            auth,
        }
    }

    /// Create a host configuration with password authentication
    pub fn with_password(
        id: impl Into<String>,
        host: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self::new(id, host, username, HostAuth::password(password))
    }

    /// Create a host configuration with private key authentication
    pub fn with_private_key(
        id: impl Into<String>,
        host: impl Into<String>,
        username: impl Into<String>,
        key_path: impl Into<PathBuf>,
    ) -> Self {
        Self::new(id, host, username, HostAuth::private_key(key_path))
    }

    /// Create a host configuration with SSH agent authentication
    pub fn with_agent(
        id: impl Into<String>,
        host: impl Into<String>,
        username: impl Into<String>,
    ) -> Self {
        Self::new(id, host, username, HostAuth::agent())
    }

    /// Set the display name
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the SSH port
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// `host:port` form used for dialing and logging
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Display name, falling back to the id
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.id
        } else {
            &self.name
        }
    }

    /// Validate the host configuration
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(FleetError::Configuration(
                "Host id cannot be empty".to_string(),
            ));
        }

        if self.host.is_empty() {
            return Err(FleetError::Configuration(format!(
                "Host address cannot be empty for host '{}'",
                self.id
            )));
        }

        if self.port == 0 {
            return Err(FleetError::Configuration(format!(
                "Port cannot be 0 for host '{}'",
                self.id
            )));
        }

        if self.username.is_empty() {
            return Err(FleetError::Configuration(format!(
                "Username cannot be empty for host '{}'",
                self.id
            )));
        }

        if let HostAuth::PrivateKey { path, .. } = &self.auth
            && path.as_os_str().is_empty()
        {
            return Err(FleetError::Configuration(format!(
                "Private key path cannot be empty for host '{}'",
                self.id
            )));
        }

        Ok(())
    }
}
