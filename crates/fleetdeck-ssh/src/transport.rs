//! SSH transport opening sessions for the connection pool

use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use async_trait::async_trait;
use fleetdeck_core::{FleetError, HostAuth, HostConfig, Result, Session, SessionTransport};
use tracing::{debug, info};

use crate::{SshSession, SshTransportError};

/// Opens authenticated SSH sessions with libssh2
///
/// # Example
///
/// ```ignore
/// use fleetdeck_ssh::SshTransport;
///
/// let transport = Arc::new(SshTransport::new().with_keepalive_seconds(15));
/// let manager = ConnectionPoolManager::new(PoolConfig::default(), transport);
/// ```
#[derive(Debug, Clone)]
pub struct SshTransport {
    keepalive_seconds: u32,
    command_timeout: Option<Duration>,
}

impl SshTransport {
    /// Create a transport with a 30 second keep-alive and no command timeout
    pub fn new() -> Self {
        Self {
            keepalive_seconds: 30,
            command_timeout: None,
        }
    }

    /// Set the keep-alive interval (0 disables it)
    ///
    /// Keep-alives go out before each command and while waiting on its output.
    pub fn with_keepalive_seconds(mut self, seconds: u32) -> Self {
        self.keepalive_seconds = seconds;
        self
    }

    /// Bound how long a command may run before the session is given up
    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = Some(timeout);
        self
    }

    /// Get the keep-alive interval in seconds
    pub fn keepalive_seconds(&self) -> u32 {
        self.keepalive_seconds
    }

    /// Get the command timeout
    pub fn command_timeout(&self) -> Option<Duration> {
        self.command_timeout
    }

    fn open_session(
        &self,
        host: &HostConfig,
        timeout: Duration,
    ) -> std::result::Result<SshSession, SshTransportError> {
        check_private_key(&host.auth)?;

        let address = host.address();
        info!(
            host_id = %host.id,
            address = %address,
            auth = host.auth.kind(),
            "opening SSH session"
        );

        let tcp = dial(&host.host, host.port, timeout)?;

        let mut session = ssh2::Session::new().map_err(|e| SshTransportError::HandshakeFailed {
            address: address.clone(),
            message: e.to_string(),
        })?;
        session.set_tcp_stream(tcp);
        session.set_timeout(millis_u32(timeout));
        session
            .handshake()
            .map_err(|e| SshTransportError::HandshakeFailed {
                address: address.clone(),
                message: e.to_string(),
            })?;

        authenticate(&mut session, &host.username, &host.auth)?;

        if self.keepalive_seconds > 0 {
            session.set_keepalive(true, self.keepalive_seconds);
        }
        // 0 means no timeout in libssh2
        session.set_timeout(self.command_timeout.map(millis_u32).unwrap_or(0));

        info!(host_id = %host.id, address = %address, "SSH session established");
        Ok(SshSession::new(session, address, self.command_timeout))
    }
}

impl Default for SshTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionTransport for SshTransport {
    fn name(&self) -> &str {
        "ssh"
    }

    async fn connect(&self, host: &HostConfig, timeout: Duration) -> Result<Box<dyn Session>> {
        let transport = self.clone();
        let host = host.clone();

        let session = tokio::task::spawn_blocking(move || transport.open_session(&host, timeout))
            .await
            .map_err(|e| FleetError::from(SshTransportError::Worker(e.to_string())))??;

        Ok(Box::new(session))
    }
}

fn millis_u32(duration: Duration) -> u32 {
    u32::try_from(duration.as_millis()).unwrap_or(u32::MAX)
}

/// Resolve `host` and dial each address until one accepts
fn dial(
    host: &str,
    port: u16,
    timeout: Duration,
) -> std::result::Result<TcpStream, SshTransportError> {
    let address = format!("{}:{}", host, port);
    let candidates: Vec<SocketAddr> = (host, port)
        .to_socket_addrs()
        .map_err(|source| SshTransportError::ResolveFailed {
            address: address.clone(),
            source,
        })?
        .collect();

    let mut last_error = None;
    for candidate in candidates {
        debug!(%candidate, "dialing");
        match TcpStream::connect_timeout(&candidate, timeout) {
            Ok(stream) => return Ok(stream),
            Err(e) => last_error = Some(e),
        }
    }

    Err(SshTransportError::ConnectionFailed {
        address,
        source: last_error.unwrap_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::NotFound, "no addresses resolved")
        }),
    })
}

/// Fail before dialing when a configured key file is missing
fn check_private_key(auth: &HostAuth) -> std::result::Result<(), SshTransportError> {
    if let HostAuth::PrivateKey { path, .. } = auth
        && !path.exists()
    {
        return Err(SshTransportError::PrivateKeyNotFound {
            path: path.display().to_string(),
        });
    }
    Ok(())
}

/// Authenticate to the SSH server using the configured method
fn authenticate(
    session: &mut ssh2::Session,
    username: &str,
    auth: &HostAuth,
) -> std::result::Result<(), SshTransportError> {
    match auth {
        HostAuth::Password { password } => {
            debug!("Authenticating with password");
            session
                .userauth_password(username, password)
                .map_err(|e| SshTransportError::AuthenticationFailed(e.to_string()))?;
        }
        HostAuth::PrivateKey { path, passphrase } => {
            debug!(path = %path.display(), "Authenticating with private key");
            session
                .userauth_pubkey_file(username, None, path, passphrase.as_deref())
                .map_err(|e| SshTransportError::InvalidPrivateKey(e.to_string()))?;
        }
        HostAuth::Agent => {
            debug!("Authenticating with SSH agent");
            authenticate_with_agent(session, username)?;
        }
    }

    if !session.authenticated() {
        return Err(SshTransportError::AuthenticationFailed(
            "Authentication not confirmed".to_string(),
        ));
    }

    debug!("SSH authentication successful");
    Ok(())
}

fn authenticate_with_agent(
    session: &mut ssh2::Session,
    username: &str,
) -> std::result::Result<(), SshTransportError> {
    let agent_error = |e: ssh2::Error| SshTransportError::AgentNotAvailable(e.to_string());

    let mut agent = session.agent().map_err(agent_error)?;
    agent.connect().map_err(agent_error)?;
    agent.list_identities().map_err(agent_error)?;

    let identities = agent.identities().map_err(agent_error)?;
    if identities.is_empty() {
        return Err(SshTransportError::AgentNotAvailable(
            "No identities in agent".to_string(),
        ));
    }

    for identity in identities {
        if agent.userauth(username, &identity).is_ok() && session.authenticated() {
            debug!("Authenticated with agent identity");
            return Ok(());
        }
    }

    Err(SshTransportError::AuthenticationFailed(
        "No agent identity worked".to_string(),
    ))
}

#[cfg(test)]
mod tests;
