//! SSH session implementing the pool's session capability

use std::io::{ErrorKind, Read};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use fleetdeck_core::{CommandOutput, FleetError, Result, Session};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::SshTransportError;

const READ_CHUNK: usize = 8192;
const IDLE_PAUSE: Duration = Duration::from_millis(1);

struct SessionInner {
    /// libssh2 sessions are driven by one thread at a time
    session: Mutex<ssh2::Session>,
    address: String,
    command_timeout: Option<Duration>,
    closed: AtomicBool,
}

impl SessionInner {
    fn run(&self, command: &str) -> std::result::Result<CommandOutput, SshTransportError> {
        let session = self.session.lock();
        let result = run_command(&session, command, self.command_timeout);
        if let Err(e) = &result {
            // Channel failures leave libssh2 in an unknown state
            warn!(address = %self.address, error = %e, "SSH channel failed, marking session closed");
            self.closed.store(true, Ordering::SeqCst);
        }
        result
    }
}

fn run_command(
    session: &ssh2::Session,
    command: &str,
    timeout: Option<Duration>,
) -> std::result::Result<CommandOutput, SshTransportError> {
    let channel_error = |e: &dyn std::fmt::Display| SshTransportError::Channel(e.to_string());

    // libssh2 only sends keepalives when asked to
    if let Err(e) = session.keepalive_send() {
        debug!(error = %e, "keepalive send failed");
    }

    let mut channel = session.channel_session().map_err(|e| channel_error(&e))?;
    channel.exec(command).map_err(|e| channel_error(&e))?;

    let mut stdout = channel.stream(0);
    let mut stderr = channel.stderr();
    session.set_blocking(false);
    let streams = read_streams(&mut stdout, &mut stderr, timeout, || {
        let _ = session.keepalive_send();
    });
    session.set_blocking(true);
    let (stdout, stderr) = streams?;

    channel.wait_close().map_err(|e| channel_error(&e))?;
    let exit_status = channel.exit_status().map_err(|e| channel_error(&e))?;

    Ok(CommandOutput::new(stdout, stderr, exit_status))
}

/// Read stdout and stderr together until both reach end of file
///
/// A remote command blocks once either stream's window is full, so neither
/// stream may wait for the other to finish. Readers report `WouldBlock` while
/// nothing is pending; `on_idle` runs on every pass that read nothing.
fn read_streams(
    stdout: &mut impl Read,
    stderr: &mut impl Read,
    timeout: Option<Duration>,
    mut on_idle: impl FnMut(),
) -> std::result::Result<(Vec<u8>, Vec<u8>), SshTransportError> {
    let started = Instant::now();
    let mut buf = [0u8; READ_CHUNK];
    let (mut out, mut err) = (Vec::new(), Vec::new());
    let (mut out_done, mut err_done) = (false, false);

    while !(out_done && err_done) {
        let mut activity = false;
        if !out_done {
            activity |= pump(stdout, &mut buf, &mut out, &mut out_done)?;
        }
        if !err_done {
            activity |= pump(stderr, &mut buf, &mut err, &mut err_done)?;
        }

        if let Some(timeout) = timeout
            && !(out_done && err_done)
            && started.elapsed() >= timeout
        {
            return Err(SshTransportError::CommandTimedOut(timeout));
        }
        if !activity {
            on_idle();
            thread::sleep(IDLE_PAUSE);
        }
    }

    Ok((out, err))
}

/// Move one chunk from `reader` into `sink`; returns whether anything happened
fn pump(
    reader: &mut impl Read,
    buf: &mut [u8],
    sink: &mut Vec<u8>,
    done: &mut bool,
) -> std::result::Result<bool, SshTransportError> {
    match reader.read(buf) {
        Ok(0) => {
            *done = true;
            Ok(true)
        }
        Ok(n) => {
            sink.extend_from_slice(&buf[..n]);
            Ok(true)
        }
        Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::Interrupted) => Ok(false),
        Err(e) => Err(SshTransportError::Channel(e.to_string())),
    }
}

/// An authenticated SSH session
///
/// Each `exec` opens a fresh channel on the session. A failed channel marks
/// the session closed so the pool discards it on release.
#[derive(Clone)]
pub struct SshSession {
    inner: Arc<SessionInner>,
}

impl SshSession {
    pub(crate) fn new(
        session: ssh2::Session,
        address: String,
        command_timeout: Option<Duration>,
    ) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                session: Mutex::new(session),
                address,
                command_timeout,
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Remote `host:port`
    pub fn address(&self) -> &str {
        &self.inner.address
    }
}

impl std::fmt::Debug for SshSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SshSession")
            .field("address", &self.inner.address)
            .field("closed", &self.inner.closed.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Session for SshSession {
    async fn exec(&self, command: &str) -> Result<CommandOutput> {
        if self.is_closed() {
            return Err(FleetError::SessionClosed);
        }
        debug!(address = %self.inner.address, command, "running remote command");

        let inner = Arc::clone(&self.inner);
        let command = command.to_string();
        let output = tokio::task::spawn_blocking(move || inner.run(&command))
            .await
            .map_err(|e| SshTransportError::Worker(e.to_string()))??;
        Ok(output)
    }

    async fn close(&self) -> Result<()> {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || {
            if let Err(e) = inner
                .session
                .lock()
                .disconnect(None, "Connection pool closed session", None)
            {
                debug!(address = %inner.address, error = %e, "error disconnecting SSH session");
            }
        })
        .await
        .map_err(|e| SshTransportError::Worker(e.to_string()))?;

        debug!(address = %self.inner.address, "SSH session closed");
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }
}
