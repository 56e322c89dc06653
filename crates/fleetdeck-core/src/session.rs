//! Session and transport capability traits

use crate::{HostConfig, Result};
use async_trait::async_trait;
use std::borrow::Cow;
use std::time::Duration;

/// Output of one remote command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Bytes the command wrote to stdout
    pub stdout: Vec<u8>,
    /// Bytes the command wrote to stderr
    pub stderr: Vec<u8>,
    /// Exit status reported by the remote side
    pub exit_status: i32,
}

impl CommandOutput {
    /// Create a command output
    pub fn new(stdout: impl Into<Vec<u8>>, stderr: impl Into<Vec<u8>>, exit_status: i32) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: stderr.into(),
            exit_status,
        }
    }

    /// Whether the command exited with status 0
    pub fn success(&self) -> bool {
        self.exit_status == 0
    }

    /// Stdout decoded as UTF-8, replacing invalid sequences
    pub fn stdout_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.stdout)
    }

    /// Stderr decoded as UTF-8, replacing invalid sequences
    pub fn stderr_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.stderr)
    }
}

/// One authenticated, live remote-execution channel to a host
#[async_trait]
pub trait Session: Send + Sync {
    /// Run a command and collect its output and exit status
    async fn exec(&self, command: &str) -> Result<CommandOutput>;

    /// Close the session
    ///
    /// Closing an already closed session is a no-op.
    async fn close(&self) -> Result<()>;

    /// Check if the transport has reported the session as closed
    fn is_closed(&self) -> bool;
}

/// Capability that opens sessions to hosts
///
/// The pool is given one transport and never speaks the remote protocol
/// itself; tests substitute a fake that succeeds, fails or stalls on demand.
#[async_trait]
pub trait SessionTransport: Send + Sync + 'static {
    /// Transport name for logs (e.g., "ssh")
    fn name(&self) -> &str;

    /// Open and authenticate a session to `host`
    ///
    /// `timeout` bounds the handshake; the pool additionally enforces it as
    /// a hard ceiling around the whole call.
    async fn connect(&self, host: &HostConfig, timeout: Duration) -> Result<Box<dyn Session>>;
}

#[async_trait]
impl<T: SessionTransport> SessionTransport for std::sync::Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn connect(&self, host: &HostConfig, timeout: Duration) -> Result<Box<dyn Session>> {
        (**self).connect(host, timeout).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_output_success() {
        let output = CommandOutput::new("ok\n", "", 0);
        assert!(output.success());
        assert_eq!(output.stdout_lossy(), "ok\n");

        let failed = CommandOutput::new("", "boom", 2);
        assert!(!failed.success());
        assert_eq!(failed.stderr_lossy(), "boom");
    }

    #[test]
    fn test_command_output_lossy_decoding() {
        let output = CommandOutput::new(vec![0x66, 0x6f, 0xff], Vec::new(), 0);
        assert_eq!(output.stdout_lossy(), "fo\u{fffd}");
    }

    #[test]
    fn test_connection_lost_classification() {
        use crate::FleetError;

        assert!(FleetError::SessionClosed.is_connection_lost());
        assert!(FleetError::Timeout("probe".into()).is_connection_lost());
        assert!(FleetError::Connection("reset".into()).is_connection_lost());
        assert!(!FleetError::Command("exit 1".into()).is_connection_lost());
        assert!(!FleetError::Authentication("denied".into()).is_connection_lost());
    }

    struct LoopbackSession {
        closed: std::sync::atomic::AtomicBool,
    }

    #[async_trait]
    impl Session for LoopbackSession {
        async fn exec(&self, command: &str) -> Result<CommandOutput> {
            if self.is_closed() {
                return Err(crate::FleetError::SessionClosed);
            }
            Ok(CommandOutput::new(command, "", 0))
        }

        async fn close(&self) -> Result<()> {
            self.closed.store(true, std::sync::atomic::Ordering::SeqCst);
            Ok(())
        }

        fn is_closed(&self) -> bool {
            self.closed.load(std::sync::atomic::Ordering::SeqCst)
        }
    }

    #[derive(Default)]
    struct LoopbackTransport {
        connects: std::sync::Mutex<Vec<(String, Duration)>>,
    }

    #[async_trait]
    impl SessionTransport for LoopbackTransport {
        fn name(&self) -> &str {
            "loopback"
        }

        async fn connect(&self, host: &HostConfig, timeout: Duration) -> Result<Box<dyn Session>> {
            self.connects
                .lock()
                .unwrap()
                .push((host.address(), timeout));
            Ok(Box::new(LoopbackSession {
                closed: std::sync::atomic::AtomicBool::new(false),
            }))
        }
    }

    #[tokio::test]
    async fn test_shared_transport_forwards_connect() {
        let inner = std::sync::Arc::new(LoopbackTransport::default());
        let shared: Box<dyn SessionTransport> = Box::new(std::sync::Arc::clone(&inner));
        assert_eq!(shared.name(), "loopback");

        let host = HostConfig::with_agent("gpu-01", "10.0.0.1", "ops");
        let session = shared.connect(&host, Duration::from_secs(3)).await.unwrap();

        let output = session.exec("echo ok").await.unwrap();
        assert!(output.success());
        assert_eq!(output.stdout_lossy(), "echo ok");

        session.close().await.unwrap();
        session.close().await.unwrap();
        assert!(session.is_closed());
        assert!(matches!(
            session.exec("echo ok").await,
            Err(crate::FleetError::SessionClosed)
        ));

        let connects = inner.connects.lock().unwrap();
        assert_eq!(connects.as_slice(), &[("10.0.0.1:22".to_string(), Duration::from_secs(3))]);
    }
}
