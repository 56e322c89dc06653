//! Dashboard configuration file
//!
//! A single TOML file describes the pool tuning, the SSH transport settings,
//! logging and the hosts to register:
//!
//! ```toml
//! [pool]
//! max_connections_per_host = 4
//! acquire_timeout_ms = 10000
//!
//! [ssh]
//! keepalive_seconds = 30
//!
//! [[hosts]]
//! id = "gpu-01"
//! host = "10.0.0.11"
//! username = "ops"
//! auth = { type = "private_key", path = "~/.ssh/id_ed25519" }
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, bail};
use fleetdeck_core::{HostAuth, HostConfig};
use fleetdeck_pool::PoolConfig;
use fleetdeck_ssh::SshTransport;
use serde::{Deserialize, Serialize};

use crate::logging::LogSettings;

/// Environment variable naming the configuration file
pub const CONFIG_ENV: &str = "FLEETDECK_CONFIG";

const CONFIG_DIR: &str = "fleetdeck";
const CONFIG_FILE: &str = "fleetdeck.toml";

/// Top-level configuration file contents
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub pool: PoolConfig,
    pub ssh: SshSettings,
    pub logging: LogSettings,
    pub hosts: Vec<HostConfig>,
}

/// Settings applied to every SSH session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SshSettings {
    /// Seconds between transport-level keepalive messages, 0 disables them
    pub keepalive_seconds: u32,
    /// Per-command timeout in seconds, 0 waits indefinitely
    pub command_timeout_secs: u64,
}

impl Default for SshSettings {
    fn default() -> Self {
        Self {
            keepalive_seconds: 30,
            command_timeout_secs: 0,
        }
    }
}

impl SshSettings {
    pub fn transport(&self) -> SshTransport {
        let transport = SshTransport::new().with_keepalive_seconds(self.keepalive_seconds);
        if self.command_timeout_secs > 0 {
            transport.with_command_timeout(Duration::from_secs(self.command_timeout_secs))
        } else {
            transport
        }
    }
}

/// Default location: `<config dir>/fleetdeck/fleetdeck.toml`
pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(CONFIG_DIR).join(CONFIG_FILE))
}

/// Explicit path if given, otherwise the default location
pub fn resolve_path(explicit: Option<&Path>) -> anyhow::Result<PathBuf> {
    match explicit {
        Some(path) => Ok(path.to_path_buf()),
        None => default_path().context(
            "no configuration directory on this platform; pass --config or set FLEETDECK_CONFIG",
        ),
    }
}

impl AppConfig {
    /// Read, parse and validate a configuration file
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config = Self::from_toml(&contents)
            .with_context(|| format!("invalid config file {}", path.display()))?;
        tracing::debug!(path = %path.display(), hosts = config.hosts.len(), "loaded configuration");
        Ok(config)
    }

    /// Parse and validate configuration text
    pub fn from_toml(contents: &str) -> anyhow::Result<Self> {
        let mut config: AppConfig = toml::from_str(contents)?;
        config.expand_key_paths();
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.pool.validate()?;

        let mut seen = HashSet::new();
        for host in &self.hosts {
            host.validate()
                .with_context(|| format!("host '{}' is invalid", host.id))?;
            if !seen.insert(host.id.as_str()) {
                bail!("duplicate host id '{}'", host.id);
            }
        }
        Ok(())
    }

    fn expand_key_paths(&mut self) {
        let Some(home) = dirs::home_dir() else {
            return;
        };
        for host in &mut self.hosts {
            if let HostAuth::PrivateKey { path, .. } = &mut host.auth
                && let Ok(rest) = path.strip_prefix("~")
            {
                *path = home.join(rest);
            }
        }
    }
}
