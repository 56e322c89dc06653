//! Deterministic fake transport for pool tests

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use fleetdeck_core::{CommandOutput, FleetError, HostConfig, Result, Session, SessionTransport};
use parking_lot::Mutex;

use crate::PoolConfig;

/// Shared state of one fake session, kept by the transport so tests can
/// break sessions the pool currently owns.
pub(crate) struct FakeSessionState {
    id: usize,
    closed: AtomicBool,
    broken: AtomicBool,
    exec_count: AtomicUsize,
    exec_delay: Mutex<Duration>,
    live: Option<Arc<AtomicUsize>>,
}

impl FakeSessionState {
    fn new(id: usize, live: Option<Arc<AtomicUsize>>) -> Self {
        Self {
            id,
            closed: AtomicBool::new(false),
            broken: AtomicBool::new(false),
            exec_count: AtomicUsize::new(0),
            exec_delay: Mutex::new(Duration::ZERO),
            live,
        }
    }

    pub(crate) fn id(&self) -> usize {
        self.id
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub(crate) fn exec_count(&self) -> usize {
        self.exec_count.load(Ordering::SeqCst)
    }

    /// Make every later exec fail without the transport noticing
    pub(crate) fn break_session(&self) {
        self.broken.store(true, Ordering::SeqCst);
    }

    /// Make every later exec take `delay` before answering
    pub(crate) fn set_exec_delay(&self, delay: Duration) {
        *self.exec_delay.lock() = delay;
    }

    /// Simulate the transport reporting the session closed
    pub(crate) fn drop_transport(&self) {
        self.mark_closed();
    }

    fn mark_closed(&self) {
        if !self.closed.swap(true, Ordering::SeqCst)
            && let Some(live) = &self.live
        {
            live.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

/// Fake session
pub(crate) struct FakeSession {
    state: Arc<FakeSessionState>,
}

impl FakeSession {
    pub(crate) fn new(id: usize) -> Self {
        Self {
            state: Arc::new(FakeSessionState::new(id, None)),
        }
    }

    pub(crate) fn exec_count(&self) -> usize {
        self.state.exec_count()
    }

    pub(crate) fn break_session(&self) {
        self.state.break_session();
    }

    pub(crate) fn set_exec_delay(&self, delay: Duration) {
        self.state.set_exec_delay(delay);
    }
}

#[async_trait]
impl Session for FakeSession {
    async fn exec(&self, command: &str) -> Result<CommandOutput> {
        if self.state.is_closed() {
            return Err(FleetError::SessionClosed);
        }
        self.state.exec_count.fetch_add(1, Ordering::SeqCst);

        let delay = *self.state.exec_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if self.state.broken.load(Ordering::SeqCst) {
            return Err(FleetError::Connection("broken pipe".into()));
        }

        match command {
            "true" => Ok(CommandOutput::new("", "", 0)),
            "false" => Ok(CommandOutput::new("", "", 1)),
            other => Ok(CommandOutput::new(format!("{}\n", other), "", 0)),
        }
    }

    async fn close(&self) -> Result<()> {
        self.state.mark_closed();
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.state.is_closed()
    }
}

/// Fake transport that counts dials and fails or stalls on demand
#[derive(Default)]
pub(crate) struct FakeTransport {
    attempts: AtomicUsize,
    failures_remaining: AtomicU32,
    always_fail: AtomicBool,
    connect_delay: Mutex<Duration>,
    live: Arc<AtomicUsize>,
    max_live: AtomicUsize,
    sessions: Mutex<Vec<Arc<FakeSessionState>>>,
}

impl FakeTransport {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Fail the next `count` connect attempts
    pub(crate) fn fail_next(&self, count: u32) {
        self.failures_remaining.store(count, Ordering::SeqCst);
    }

    pub(crate) fn set_always_fail(&self, fail: bool) {
        self.always_fail.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn set_connect_delay(&self, delay: Duration) {
        *self.connect_delay.lock() = delay;
    }

    /// Number of connect calls, successful or not
    pub(crate) fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Number of sessions handed out
    pub(crate) fn created(&self) -> usize {
        self.sessions.lock().len()
    }

    /// Sessions currently open
    pub(crate) fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneously open sessions
    pub(crate) fn max_live(&self) -> usize {
        self.max_live.load(Ordering::SeqCst)
    }

    pub(crate) fn session(&self, index: usize) -> Arc<FakeSessionState> {
        Arc::clone(&self.sessions.lock()[index])
    }

    pub(crate) fn sessions(&self) -> Vec<Arc<FakeSessionState>> {
        self.sessions.lock().clone()
    }
}

#[async_trait]
impl SessionTransport for FakeTransport {
    fn name(&self) -> &str {
        "fake"
    }

    async fn connect(&self, host: &HostConfig, _timeout: Duration) -> Result<Box<dyn Session>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        let delay = *self.connect_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if self.always_fail.load(Ordering::SeqCst) {
            return Err(FleetError::Connection(format!(
                "connection refused by {}",
                host.address()
            )));
        }

        let should_fail = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            return Err(FleetError::Connection(format!(
                "connection refused by {}",
                host.address()
            )));
        }

        let live = self.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_live.fetch_max(live, Ordering::SeqCst);

        let mut sessions = self.sessions.lock();
        let state = Arc::new(FakeSessionState::new(
            sessions.len(),
            Some(Arc::clone(&self.live)),
        ));
        sessions.push(Arc::clone(&state));

        Ok(Box::new(FakeSession { state }))
    }
}

pub(crate) fn host(id: &str) -> HostConfig {
    HostConfig::with_password(id, format!("{}.gpu.lan", id), "ops", "secret")
}

/// Config with every background timer disabled so tests drive passes by hand
pub(crate) fn quiet_config(min: usize, max: usize) -> PoolConfig {
    PoolConfig::new(min, max)
        .with_keep_alive_interval_ms(0)
        .with_health_check_interval_ms(0)
        .with_idle_sweep_interval_ms(0)
        .with_retry_delay_ms(10)
        .with_connection_timeout_ms(1_000)
        .with_probe_timeout_ms(100)
}
