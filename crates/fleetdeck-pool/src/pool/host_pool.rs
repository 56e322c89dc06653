//! Connection pool for a single host
//!
//! All bookkeeping for one host lives behind one mutex: the connection
//! table, the idle deque and the FIFO waiter queue. Every decision about
//! handing out, parking or creating a connection is made while that lock is
//! held, and the lock is never held across an await.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use fleetdeck_core::{FleetError, HostConfig, Session, SessionTransport};
use futures::future::join_all;
use parking_lot::{Mutex, RwLock};
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::time::Instant;

use super::connection::{ConnectionId, ConnectionState, PooledConnection, PooledSession};
use super::stats::{Gauges, HostCounters, HostStats};
use crate::events::EventBus;
use crate::health::{HostHealth, ProbeKind, ping_session};
use crate::{DestroyReason, PoolConfig, PoolError, PoolEvent, PoolResult, RetryPolicy};

/// Events buffered per subscriber before slow receivers start lagging
const EVENT_CAPACITY: usize = 256;

/// State shared by every host pool of one manager
pub(crate) struct PoolContext {
    pub(crate) config: PoolConfig,
    pub(crate) transport: Arc<dyn SessionTransport>,
    pub(crate) retry: RetryPolicy,
    pub(crate) events: EventBus,
    pub(crate) initialized: AtomicBool,
    pub(crate) shutting_down: AtomicBool,
}

impl PoolContext {
    pub(crate) fn new(config: PoolConfig, transport: Arc<dyn SessionTransport>) -> Self {
        let retry = RetryPolicy::from_config(&config);
        Self {
            config,
            transport,
            retry,
            events: EventBus::new(EVENT_CAPACITY),
            initialized: AtomicBool::new(false),
            shutting_down: AtomicBool::new(false),
        }
    }
}

struct ConnectionEntry {
    state: ConnectionState,
    /// Set once connected; lets shutdown reach sessions that are borrowed
    session: Option<Weak<dyn Session>>,
}

struct Waiter {
    id: u64,
    tx: oneshot::Sender<PoolResult<PooledSession>>,
}

struct HostPoolState {
    connections: HashMap<ConnectionId, ConnectionEntry>,
    /// Parked sessions; acquire takes from the back
    idle: VecDeque<PooledSession>,
    waiters: VecDeque<Waiter>,
    next_waiter_id: u64,
    /// Background connects started by the pool itself
    replacements_in_flight: usize,
    /// Connect sequences that failed since the last success
    connect_failures: u32,
    /// Set after the first successful connect; minimum maintenance starts then
    warm: bool,
    closed: Option<DestroyReason>,
    health: HostHealth,
}

impl HostPoolState {
    fn new() -> Self {
        Self {
            connections: HashMap::new(),
            idle: VecDeque::new(),
            waiters: VecDeque::new(),
            next_waiter_id: 0,
            replacements_in_flight: 0,
            connect_failures: 0,
            warm: false,
            closed: None,
            health: HostHealth::default(),
        }
    }

    fn count(&self, state: ConnectionState) -> usize {
        self.connections
            .values()
            .filter(|entry| entry.state == state)
            .count()
    }

    fn set_state(&mut self, id: ConnectionId, state: ConnectionState) {
        if let Some(entry) = self.connections.get_mut(&id) {
            entry.state = state;
        }
    }

    fn insert_connecting(&mut self) -> ConnectionId {
        let id = ConnectionId::next();
        self.connections.insert(
            id,
            ConnectionEntry {
                state: ConnectionState::Connecting,
                session: None,
            },
        );
        id
    }

    fn remove_waiter(&mut self, id: u64) -> bool {
        match self.waiters.iter().position(|waiter| waiter.id == id) {
            Some(position) => {
                self.waiters.remove(position);
                true
            }
            None => false,
        }
    }

    fn gauges(&self) -> Gauges {
        Gauges {
            total: self.connections.len(),
            active: self.count(ConnectionState::Active),
            idle: self.count(ConnectionState::Idle),
            waiting: self.waiters.len(),
        }
    }
}

/// Pool of sessions to one host
pub(crate) struct HostPool {
    host_id: String,
    host: RwLock<HostConfig>,
    ctx: Arc<PoolContext>,
    state: Mutex<HostPoolState>,
    counters: HostCounters,
}

enum AcquirePlan {
    Ready(PooledSession),
    Create(SlotReservation),
    Wait(PendingWaiter),
}

impl HostPool {
    pub(crate) fn new(host: HostConfig, ctx: Arc<PoolContext>) -> Arc<Self> {
        Arc::new(Self {
            host_id: host.id.clone(),
            host: RwLock::new(host),
            ctx,
            state: Mutex::new(HostPoolState::new()),
            counters: HostCounters::default(),
        })
    }

    pub(crate) fn host_id(&self) -> &str {
        &self.host_id
    }

    pub(crate) fn host(&self) -> HostConfig {
        self.host.read().clone()
    }

    /// Replace the host configuration; live connections are kept
    pub(crate) fn update_host(&self, host: HostConfig) {
        *self.host.write() = host;
    }

    pub(crate) fn stats(&self) -> HostStats {
        let gauges = self.state.lock().gauges();
        HostStats::from_parts(&self.host_id, gauges, &self.counters)
    }

    pub(crate) fn gauges(&self) -> Gauges {
        self.state.lock().gauges()
    }

    pub(crate) fn health(&self) -> HostHealth {
        self.state.lock().health.clone()
    }

    /// Borrow a connection, waiting at most `timeout` when the pool is full
    pub(crate) async fn acquire(self: &Arc<Self>, timeout: Duration) -> PoolResult<PooledConnection> {
        match self.plan_acquire()? {
            AcquirePlan::Ready(session) => Ok(PooledConnection::new(session, Arc::clone(self))),
            AcquirePlan::Create(mut reservation) => {
                let result = self.establish().await;
                let claimed = {
                    let mut state = self.state.lock();
                    reservation.disarm(&mut state);
                    match result {
                        Ok(session) => self.claim_new_locked(&mut state, reservation.id, session),
                        Err(err) => {
                            self.forget_failed_locked(&mut state, reservation.id, &err);
                            self.replenish_locked(&mut state);
                            Err(err)
                        }
                    }
                };
                claimed.map(|session| PooledConnection::new(session, Arc::clone(self)))
            }
            AcquirePlan::Wait(waiter) => waiter.wait(timeout).await,
        }
    }

    fn plan_acquire(self: &Arc<Self>) -> PoolResult<AcquirePlan> {
        let mut state = self.state.lock();
        if state.closed.is_some() || self.ctx.shutting_down.load(Ordering::Acquire) {
            return Err(PoolError::PoolShuttingDown);
        }

        // Queued callers go first; a newcomer never overtakes them
        if state.waiters.is_empty() {
            while let Some(mut session) = state.idle.pop_back() {
                if session.session.is_closed() {
                    state.set_state(session.id, ConnectionState::Unhealthy);
                    self.destroy_locked(&mut state, session, DestroyReason::TransportClosed);
                    continue;
                }
                session.checkout();
                state.set_state(session.id, ConnectionState::Active);
                HostCounters::bump(&self.counters.borrows);
                HostCounters::bump(&self.counters.saved_reconnections);
                tracing::trace!(host_id = %self.host_id, connection_id = %session.id, "reusing idle connection");
                return Ok(AcquirePlan::Ready(session));
            }

            // A connection under probe comes back shortly; wait for it
            // rather than dialing a new one
            if state.count(ConnectionState::Probing) == 0
                && state.connections.len() < self.ctx.config.max_connections_per_host()
            {
                let id = state.insert_connecting();
                return Ok(AcquirePlan::Create(SlotReservation::new(
                    Arc::clone(self),
                    id,
                    SlotKind::Caller,
                )));
            }
        }

        let id = state.next_waiter_id;
        state.next_waiter_id += 1;
        let (tx, rx) = oneshot::channel();
        state.waiters.push_back(Waiter { id, tx });
        tracing::debug!(
            host_id = %self.host_id,
            waiting = state.waiters.len(),
            "pool at capacity, queueing caller"
        );
        self.replenish_locked(&mut state);

        Ok(AcquirePlan::Wait(PendingWaiter {
            pool: Arc::clone(self),
            id,
            rx,
            settled: false,
        }))
    }

    /// Give a borrowed session back
    ///
    /// Never waits: the session goes to the oldest waiter, back to the idle
    /// deque, or is destroyed and replaced.
    pub(crate) fn release_session(self: &Arc<Self>, mut session: PooledSession, mark_unhealthy: bool) {
        let transport_closed = session.session.is_closed();
        let mut state = self.state.lock();

        if let Some(reason) = state.closed {
            self.destroy_locked(&mut state, session, reason);
            return;
        }

        if mark_unhealthy || transport_closed {
            let reason = if mark_unhealthy {
                DestroyReason::ReleasedUnhealthy
            } else {
                DestroyReason::TransportClosed
            };
            state.set_state(session.id, ConnectionState::Unhealthy);
            self.destroy_locked(&mut state, session, reason);
            self.replenish_locked(&mut state);
            return;
        }

        session.touch();
        HostCounters::bump(&self.counters.returns);
        self.dispatch_locked(&mut state, session, true);
    }

    /// Hand `session` to the oldest live waiter, or park it as idle
    fn dispatch_locked(&self, state: &mut HostPoolState, mut session: PooledSession, reused: bool) {
        while let Some(waiter) = state.waiters.pop_front() {
            let id = session.id;
            session.checkout();
            match waiter.tx.send(Ok(session)) {
                Ok(()) => {
                    state.set_state(id, ConnectionState::Active);
                    HostCounters::bump(&self.counters.borrows);
                    if reused {
                        HostCounters::bump(&self.counters.saved_reconnections);
                    }
                    tracing::trace!(host_id = %self.host_id, connection_id = %id, "handed connection to waiter");
                    return;
                }
                // Waiter gave up between its timeout and our send
                Err(returned) => {
                    let Ok(mut returned) = returned else { return };
                    returned.use_count = returned.use_count.saturating_sub(1);
                    session = returned;
                }
            }
        }

        state.set_state(session.id, ConnectionState::Idle);
        state.idle.push_back(session);
    }

    fn destroy_locked(&self, state: &mut HostPoolState, session: PooledSession, reason: DestroyReason) {
        state.connections.remove(&session.id);
        HostCounters::bump(&self.counters.destroyed);
        tracing::debug!(
            host_id = %self.host_id,
            connection_id = %session.id,
            %reason,
            "destroying connection"
        );
        self.ctx.events.emit(PoolEvent::ConnectionDestroyed {
            host_id: self.host_id.clone(),
            connection_id: session.id,
            reason,
        });
        spawn_close(session.session);
    }

    /// Start background connects for queued callers and the idle minimum
    fn replenish_locked(self: &Arc<Self>, state: &mut HostPoolState) {
        if state.closed.is_some() {
            return;
        }

        let config = &self.ctx.config;
        let capacity = config
            .max_connections_per_host()
            .saturating_sub(state.connections.len());
        if capacity == 0 {
            return;
        }

        let probing = state.count(ConnectionState::Probing);
        let for_waiters = state
            .waiters
            .len()
            .saturating_sub(state.replacements_in_flight + probing);
        let for_minimum = if state.warm && state.connect_failures == 0 {
            config.min_connections_per_host().saturating_sub(
                state.count(ConnectionState::Idle) + probing + state.replacements_in_flight,
            )
        } else {
            0
        };

        let wanted = for_waiters.max(for_minimum).min(capacity);
        for _ in 0..wanted {
            if !self.spawn_replacement_locked(state) {
                break;
            }
        }
    }

    fn spawn_replacement_locked(self: &Arc<Self>, state: &mut HostPoolState) -> bool {
        let Ok(handle) = Handle::try_current() else {
            return false;
        };

        let id = state.insert_connecting();
        state.replacements_in_flight += 1;
        tracing::debug!(host_id = %self.host_id, connection_id = %id, "starting background connect");

        let pool = Arc::clone(self);
        handle.spawn(async move {
            // Guard is built inside the task so a task dropped unpolled
            // never touches the lock we are holding here
            let reservation = SlotReservation::new(Arc::clone(&pool), id, SlotKind::Replacement);
            pool.run_replacement(reservation).await;
        });
        true
    }

    async fn run_replacement(self: Arc<Self>, mut reservation: SlotReservation) {
        let result = self.establish().await;
        let mut state = self.state.lock();
        reservation.disarm(&mut state);

        match result {
            Ok(session) => self.park_new_locked(&mut state, reservation.id, session),
            Err(err) => {
                self.forget_failed_locked(&mut state, reservation.id, &err);
                if let Some(waiter) = state.waiters.pop_front() {
                    let _ = waiter.tx.send(Err(err));
                }
                self.replenish_locked(&mut state);
            }
        }
    }

    /// Run one connect sequence with retries
    async fn establish(&self) -> PoolResult<Arc<dyn Session>> {
        let host = self.host();
        let transport = Arc::clone(&self.ctx.transport);
        let timeout = self.ctx.config.connection_timeout();
        let max_attempts = self.ctx.retry.max_attempts();

        let result = crate::retry_with_backoff(
            &self.ctx.retry,
            |_| connect_once(transport.as_ref(), &host, timeout),
            |attempt, err| {
                HostCounters::bump(&self.counters.errors);
                tracing::warn!(
                    host_id = %self.host_id,
                    attempt,
                    max_attempts,
                    error = %err,
                    "connect attempt failed"
                );
                self.ctx.events.emit(PoolEvent::ConnectAttemptFailed {
                    host_id: self.host_id.clone(),
                    attempt,
                    max_attempts,
                    error: err.to_string(),
                });
            },
        )
        .await;

        match result {
            Ok(session) => Ok(Arc::from(session)),
            Err(exhausted) => Err(PoolError::ConnectFailed {
                host_id: self.host_id.clone(),
                attempts: exhausted.attempts,
                last_error: exhausted.last_error,
            }),
        }
    }

    /// Finish a caller's own connect; the session goes straight to them
    fn claim_new_locked(
        &self,
        state: &mut HostPoolState,
        id: ConnectionId,
        session: Arc<dyn Session>,
    ) -> PoolResult<PooledSession> {
        if state.closed.is_some() {
            state.connections.remove(&id);
            spawn_close(session);
            return Err(PoolError::PoolShuttingDown);
        }

        self.on_connected_locked(state, id, &session, ConnectionState::Active);
        HostCounters::bump(&self.counters.borrows);
        let mut pooled = PooledSession::new(id, session);
        pooled.checkout();
        Ok(pooled)
    }

    /// Finish a background connect; the session goes to a waiter or idle
    fn park_new_locked(&self, state: &mut HostPoolState, id: ConnectionId, session: Arc<dyn Session>) {
        if state.closed.is_some() {
            state.connections.remove(&id);
            spawn_close(session);
            return;
        }

        self.on_connected_locked(state, id, &session, ConnectionState::Idle);
        self.dispatch_locked(state, PooledSession::new(id, session), false);
    }

    fn on_connected_locked(
        &self,
        state: &mut HostPoolState,
        id: ConnectionId,
        session: &Arc<dyn Session>,
        connection_state: ConnectionState,
    ) {
        if let Some(entry) = state.connections.get_mut(&id) {
            entry.state = connection_state;
            entry.session = Some(Arc::downgrade(session));
        }
        state.warm = true;
        state.connect_failures = 0;
        state.health.record_connected();
        self.ctx.initialized.store(true, Ordering::Release);
        HostCounters::bump(&self.counters.created);

        tracing::info!(host_id = %self.host_id, connection_id = %id, "connection established");
        self.ctx.events.emit(PoolEvent::ConnectionCreated {
            host_id: self.host_id.clone(),
            connection_id: id,
        });
    }

    fn forget_failed_locked(&self, state: &mut HostPoolState, id: ConnectionId, err: &PoolError) {
        state.connections.remove(&id);
        state.connect_failures = state.connect_failures.saturating_add(1);
        let failures = state.health.record_failure(err.to_string());

        tracing::error!(host_id = %self.host_id, consecutive_failures = failures, error = %err, "host unreachable");
        self.ctx.events.emit(PoolEvent::HostUnhealthy {
            host_id: self.host_id.clone(),
            error: err.to_string(),
        });
    }

    /// Pre-establish the minimum number of idle connections (at least one)
    ///
    /// Returns how many connections were created.
    pub(crate) async fn warm_up(self: &Arc<Self>) -> PoolResult<usize> {
        let reservations = {
            let mut state = self.state.lock();
            if state.closed.is_some() {
                return Err(PoolError::PoolShuttingDown);
            }

            let config = &self.ctx.config;
            let target = config.min_connections_per_host().max(1);
            let have = state.count(ConnectionState::Idle)
                + state.count(ConnectionState::Probing)
                + state.count(ConnectionState::Connecting);
            let capacity = config
                .max_connections_per_host()
                .saturating_sub(state.connections.len());
            let needed = target.saturating_sub(have).min(capacity);

            (0..needed)
                .map(|_| {
                    let id = state.insert_connecting();
                    SlotReservation::new(Arc::clone(self), id, SlotKind::Caller)
                })
                .collect::<Vec<_>>()
        };

        let results = join_all(reservations.into_iter().map(|r| self.fill_slot(r))).await;

        let mut created = 0;
        let mut first_error = None;
        for result in results {
            match result {
                Ok(()) => created += 1,
                Err(err) => {
                    first_error.get_or_insert(err);
                }
            }
        }

        match first_error {
            Some(err) if created == 0 => Err(err),
            _ => Ok(created),
        }
    }

    async fn fill_slot(self: &Arc<Self>, mut reservation: SlotReservation) -> PoolResult<()> {
        let result = self.establish().await;
        let mut state = self.state.lock();
        reservation.disarm(&mut state);

        match result {
            Ok(session) => {
                self.park_new_locked(&mut state, reservation.id, session);
                Ok(())
            }
            Err(err) => {
                self.forget_failed_locked(&mut state, reservation.id, &err);
                Err(err)
            }
        }
    }

    /// Top the pool back up to its idle minimum and serve stranded waiters
    pub(crate) fn maintain_minimum(self: &Arc<Self>) {
        let mut state = self.state.lock();
        self.replenish_locked(&mut state);
    }

    /// Close idle connections unused for longer than the idle timeout
    ///
    /// Oldest first, never taking the host below its minimum. Returns the
    /// number of connections evicted.
    pub(crate) fn sweep_idle(self: &Arc<Self>) -> usize {
        let mut state = self.state.lock();
        if state.closed.is_some() {
            return 0;
        }

        let now = Instant::now();
        let idle_timeout = self.ctx.config.idle_timeout();
        let min = self.ctx.config.min_connections_per_host();

        let mut expired: Vec<(Instant, ConnectionId)> = state
            .idle
            .iter()
            .filter(|session| now.duration_since(session.last_used_at) > idle_timeout)
            .map(|session| (session.last_used_at, session.id))
            .collect();
        expired.sort();

        let mut evicted = 0;
        for (_, id) in expired {
            if state.connections.len() <= min {
                break;
            }
            let Some(position) = state.idle.iter().position(|session| session.id == id) else {
                continue;
            };
            if let Some(session) = state.idle.remove(position) {
                state.set_state(id, ConnectionState::Closing);
                self.destroy_locked(&mut state, session, DestroyReason::IdleTimeout);
                evicted += 1;
            }
        }

        if evicted > 0 {
            tracing::debug!(host_id = %self.host_id, evicted, "evicted idle connections");
        }
        evicted
    }

    /// Probe idle connections and replace the ones that fail
    ///
    /// Health checks probe every idle connection; keep-alive probes only
    /// those with no activity for a full keep-alive interval. Borrowed
    /// connections are never probed. While a probe runs its connection is
    /// `Probing`: acquire queues behind it instead of dialing, and a passing
    /// probe hands the connection to the oldest waiter. Returns the number
    /// of failed probes.
    pub(crate) async fn probe_idle(self: &Arc<Self>, kind: ProbeKind) -> usize {
        let candidates: Vec<PooledSession> = {
            let mut state = self.state.lock();
            if state.closed.is_some() {
                return 0;
            }
            let candidates: Vec<PooledSession> = match kind {
                ProbeKind::HealthCheck => state.idle.drain(..).collect(),
                ProbeKind::KeepAlive => {
                    let Some(interval) = self.ctx.config.keep_alive_interval() else {
                        return 0;
                    };
                    let now = Instant::now();
                    let (due, keep): (VecDeque<_>, VecDeque<_>) = state
                        .idle
                        .drain(..)
                        .partition(|session| now.duration_since(session.last_activity()) >= interval);
                    state.idle = keep;
                    due.into_iter().collect()
                }
            };
            for session in &candidates {
                state.set_state(session.id, ConnectionState::Probing);
            }
            candidates
        };

        if candidates.is_empty() {
            return 0;
        }

        let command = self.ctx.config.probe_command();
        let timeout = self.ctx.config.probe_timeout();
        let results = join_all(candidates.into_iter().map(|session| async move {
            let outcome = ping_session(session.session.as_ref(), command, timeout).await;
            (session, outcome)
        }))
        .await;

        let mut failures = 0;
        let mut state = self.state.lock();
        for (mut session, outcome) in results {
            if let Some(reason) = state.closed {
                state.set_state(session.id, ConnectionState::Closing);
                self.destroy_locked(&mut state, session, reason);
                continue;
            }
            match outcome {
                Ok(latency) => {
                    session.last_probed_at = Some(Instant::now());
                    state.health.record_success(latency);
                    self.dispatch_locked(&mut state, session, true);
                }
                Err(ping_error) => {
                    failures += 1;
                    HostCounters::bump(&self.counters.probe_failures);
                    HostCounters::bump(&self.counters.errors);

                    let err = kind.failure(ping_error.to_string());
                    tracing::warn!(
                        host_id = %self.host_id,
                        connection_id = %session.id,
                        error = %err,
                        "probe failed"
                    );
                    state.health.record_failure(err.to_string());
                    self.ctx.events.emit(PoolEvent::HostUnhealthy {
                        host_id: self.host_id.clone(),
                        error: err.to_string(),
                    });

                    state.set_state(session.id, ConnectionState::Unhealthy);
                    self.destroy_locked(&mut state, session, kind.destroy_reason());
                }
            }
        }
        self.replenish_locked(&mut state);

        failures
    }

    /// Close the pool
    ///
    /// Fails queued callers with `PoolShuttingDown`, closes idle sessions and
    /// force-closes borrowed and probing ones. Connects still in flight close when they
    /// finish. Calling it again is a no-op.
    pub(crate) async fn close(self: &Arc<Self>, reason: DestroyReason) {
        let (waiters, sessions) = {
            let mut state = self.state.lock();
            if state.closed.is_some() {
                return;
            }
            state.closed = Some(reason);

            let waiters: Vec<Waiter> = state.waiters.drain(..).collect();
            let idle: Vec<PooledSession> = state.idle.drain(..).collect();

            let mut sessions: Vec<Arc<dyn Session>> = Vec::with_capacity(idle.len());
            for session in idle {
                state.connections.remove(&session.id);
                HostCounters::bump(&self.counters.destroyed);
                self.ctx.events.emit(PoolEvent::ConnectionDestroyed {
                    host_id: self.host_id.clone(),
                    connection_id: session.id,
                    reason,
                });
                sessions.push(session.session);
            }

            for entry in state.connections.values_mut() {
                if matches!(entry.state, ConnectionState::Active | ConnectionState::Probing) {
                    entry.state = ConnectionState::Closing;
                    if let Some(session) = entry.session.as_ref().and_then(Weak::upgrade) {
                        sessions.push(session);
                    }
                }
            }

            (waiters, sessions)
        };

        for waiter in waiters {
            let _ = waiter.tx.send(Err(PoolError::PoolShuttingDown));
        }

        tracing::info!(host_id = %self.host_id, closing = sessions.len(), %reason, "closing host pool");

        let timeout = self.ctx.config.probe_timeout();
        join_all(sessions.into_iter().map(|session| {
            let host_id = self.host_id.as_str();
            async move {
                match tokio::time::timeout(timeout, session.close()).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => tracing::debug!(host_id, error = %e, "error closing session"),
                    Err(_) => tracing::debug!(host_id, "timed out closing session"),
                }
            }
        }))
        .await;
    }
}

async fn connect_once(
    transport: &dyn SessionTransport,
    host: &HostConfig,
    timeout: Duration,
) -> fleetdeck_core::Result<Box<dyn Session>> {
    match tokio::time::timeout(timeout, transport.connect(host, timeout)).await {
        Ok(result) => result,
        Err(_) => Err(FleetError::Timeout(format!(
            "connect to {} did not finish within {:?}",
            host.address(),
            timeout
        ))),
    }
}

fn spawn_close(session: Arc<dyn Session>) {
    let Ok(handle) = Handle::try_current() else {
        return;
    };
    handle.spawn(async move {
        if let Err(e) = session.close().await {
            tracing::debug!(error = %e, "error closing session");
        }
    });
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlotKind {
    Caller,
    Replacement,
}

/// A connection slot counted against the maximum while its connect runs
///
/// Dropping an armed reservation (a cancelled acquire) frees the slot.
struct SlotReservation {
    pool: Arc<HostPool>,
    id: ConnectionId,
    kind: SlotKind,
    armed: bool,
}

impl SlotReservation {
    fn new(pool: Arc<HostPool>, id: ConnectionId, kind: SlotKind) -> Self {
        Self {
            pool,
            id,
            kind,
            armed: true,
        }
    }

    fn disarm(&mut self, state: &mut HostPoolState) {
        if self.armed && self.kind == SlotKind::Replacement {
            state.replacements_in_flight = state.replacements_in_flight.saturating_sub(1);
        }
        self.armed = false;
    }
}

impl Drop for SlotReservation {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut state = self.pool.state.lock();
        state.connections.remove(&self.id);
        if self.kind == SlotKind::Replacement {
            state.replacements_in_flight = state.replacements_in_flight.saturating_sub(1);
        } else {
            self.pool.replenish_locked(&mut state);
        }
    }
}

/// A caller queued for a connection
struct PendingWaiter {
    pool: Arc<HostPool>,
    id: u64,
    rx: oneshot::Receiver<PoolResult<PooledSession>>,
    settled: bool,
}

impl PendingWaiter {
    async fn wait(mut self, timeout: Duration) -> PoolResult<PooledConnection> {
        match tokio::time::timeout(timeout, &mut self.rx).await {
            Ok(received) => {
                self.settled = true;
                self.into_connection(received.map_err(|_| ()))
            }
            Err(_) => self.expire(timeout),
        }
    }

    fn expire(mut self, timeout: Duration) -> PoolResult<PooledConnection> {
        let removed = self.pool.state.lock().remove_waiter(self.id);
        self.settled = true;

        if removed {
            HostCounters::bump(&self.pool.counters.acquire_timeouts);
            tracing::debug!(host_id = %self.pool.host_id, ?timeout, "acquire timed out");
            return Err(PoolError::AcquireTimeout {
                host_id: self.pool.host_id.clone(),
                timeout,
            });
        }

        // Served in the same instant the timer fired
        let received = self.rx.try_recv().map_err(|_| ());
        self.into_connection(received)
    }

    fn into_connection(
        &self,
        received: Result<PoolResult<PooledSession>, ()>,
    ) -> PoolResult<PooledConnection> {
        match received {
            Ok(Ok(session)) => Ok(PooledConnection::new(session, Arc::clone(&self.pool))),
            Ok(Err(err)) => Err(err),
            Err(()) => Err(PoolError::PoolShuttingDown),
        }
    }
}

impl Drop for PendingWaiter {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        // Caller went away; leave the queue or hand back what we were given
        let removed = self.pool.state.lock().remove_waiter(self.id);
        if !removed && let Ok(Ok(session)) = self.rx.try_recv() {
            self.pool.release_session(session, false);
        }
    }
}
