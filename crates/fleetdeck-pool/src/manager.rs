//! Pool manager for multiplexing host pools by host id

mod scheduler;


use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use fleetdeck_core::{CommandOutput, HostConfig, SessionTransport};
use futures::future::join_all;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::health::ProbeKind;
use crate::pool::{HostPool, PoolContext};
use crate::{DestroyReason, HostStats, PoolConfig, PoolError, PoolEvent, PoolResult, PooledConnection};

/// Snapshot returned by [`ConnectionPoolManager::pool_status`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PoolStatus {
    /// False until a first connection succeeds; false again after shutdown
    pub initialized: bool,
    /// Registered hosts ordered by id
    pub hosts: Vec<HostStatus>,
}

/// Per-host part of [`PoolStatus`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HostStatus {
    pub id: String,
    pub name: String,
    pub healthy: bool,
    pub idle_count: usize,
    pub active_count: usize,
    pub total_count: usize,
    pub waiting: usize,
    pub last_error: Option<String>,
}

pub(crate) struct ManagerInner {
    ctx: Arc<PoolContext>,
    hosts: RwLock<HashMap<String, Arc<HostPool>>>,
    scheduler: Mutex<Option<JoinHandle<()>>>,
    cancel: CancellationToken,
}

impl ManagerInner {
    fn pools(&self) -> Vec<Arc<HostPool>> {
        self.hosts.read().values().cloned().collect()
    }

    fn sweep_idle(&self) -> usize {
        self.pools().iter().map(|pool| pool.sweep_idle()).sum()
    }

    fn maintain_minimum(&self) {
        for pool in self.pools() {
            pool.maintain_minimum();
        }
    }

    async fn probe(&self, kind: ProbeKind) -> usize {
        let pools = self.pools();
        join_all(pools.iter().map(|pool| pool.probe_idle(kind)))
            .await
            .into_iter()
            .sum()
    }
}

impl Drop for ManagerInner {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Manages one connection pool per registered host
///
/// The manager is a cheap, cloneable handle meant to be constructed once and
/// injected into whatever needs remote command execution. Hosts never share
/// a lock, so a slow or unreachable host does not hold up the others.
///
/// Background maintenance (idle sweep, keep-alive, health checks) starts on
/// the first `register_host` made inside a tokio runtime.
#[derive(Clone)]
pub struct ConnectionPoolManager {
    inner: Arc<ManagerInner>,
}

impl ConnectionPoolManager {
    /// Create a manager with no hosts
    ///
    /// Opens no connections and spawns nothing.
    pub fn new(config: PoolConfig, transport: Arc<dyn SessionTransport>) -> Self {
        tracing::debug!(
            transport = transport.name(),
            max_per_host = config.max_connections_per_host(),
            min_per_host = config.min_connections_per_host(),
            "creating connection pool manager"
        );
        Self {
            inner: Arc::new(ManagerInner {
                ctx: Arc::new(PoolContext::new(config, transport)),
                hosts: RwLock::new(HashMap::new()),
                scheduler: Mutex::new(None),
                cancel: CancellationToken::new(),
            }),
        }
    }

    /// Get the pool configuration
    pub fn config(&self) -> &PoolConfig {
        &self.inner.ctx.config
    }

    /// Register a host, or replace the configuration of a registered one
    ///
    /// Live connections to a re-registered host are kept. No connection is
    /// opened until the first acquire or warm-up.
    #[tracing::instrument(skip(self, host), fields(host_id = %host.id))]
    pub fn register_host(&self, host: HostConfig) -> PoolResult<()> {
        if self.is_shut_down() {
            return Err(PoolError::PoolShuttingDown);
        }
        host.validate().map_err(PoolError::InvalidHost)?;

        {
            let mut hosts = self.inner.hosts.write();
            match hosts.get(&host.id) {
                Some(pool) => {
                    tracing::info!("updating host configuration");
                    pool.update_host(host);
                }
                None => {
                    tracing::info!(address = %host.address(), "registering host");
                    let id = host.id.clone();
                    hosts.insert(id, HostPool::new(host, Arc::clone(&self.inner.ctx)));
                }
            }
        }

        self.ensure_scheduler();
        Ok(())
    }

    /// Remove a host and close its connections
    ///
    /// Connections still borrowed are force-closed and destroyed on release.
    #[tracing::instrument(skip(self))]
    pub async fn unregister_host(&self, host_id: &str) -> PoolResult<()> {
        let pool = self
            .inner
            .hosts
            .write()
            .remove(host_id)
            .ok_or_else(|| PoolError::UnknownHost(host_id.to_string()))?;

        tracing::info!("unregistering host");
        pool.close(DestroyReason::HostRemoved).await;
        Ok(())
    }

    /// Ids of the registered hosts, sorted
    pub fn host_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.inner.hosts.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Check if a host is registered
    pub fn contains_host(&self, host_id: &str) -> bool {
        self.inner.hosts.read().contains_key(host_id)
    }

    /// Configuration of a registered host
    pub fn host(&self, host_id: &str) -> PoolResult<HostConfig> {
        Ok(self.pool(host_id)?.host())
    }

    fn pool(&self, host_id: &str) -> PoolResult<Arc<HostPool>> {
        self.inner
            .hosts
            .read()
            .get(host_id)
            .cloned()
            .ok_or_else(|| PoolError::UnknownHost(host_id.to_string()))
    }

    /// Borrow a connection, waiting up to the configured acquire timeout
    pub async fn acquire(&self, host_id: &str) -> PoolResult<PooledConnection> {
        self.acquire_timeout(host_id, self.config().acquire_timeout())
            .await
    }

    /// Borrow a connection, waiting at most `timeout` when the host is at capacity
    #[tracing::instrument(skip(self), level = "debug")]
    pub async fn acquire_timeout(
        &self,
        host_id: &str,
        timeout: Duration,
    ) -> PoolResult<PooledConnection> {
        if self.is_shut_down() {
            return Err(PoolError::PoolShuttingDown);
        }
        let pool = self.pool(host_id)?;
        pool.acquire(timeout).await
    }

    /// Return a borrowed connection
    pub fn release(&self, connection: PooledConnection) {
        connection.release();
    }

    /// Return a borrowed connection as unhealthy so it is closed and replaced
    pub fn release_unhealthy(&self, connection: PooledConnection) {
        connection.release_unhealthy();
    }

    /// Run a command on a borrowed connection
    ///
    /// The caller still owns the connection and has to release it.
    pub async fn exec(
        &self,
        connection: &PooledConnection,
        command: &str,
    ) -> PoolResult<CommandOutput> {
        Ok(connection.exec(command).await?)
    }

    /// Acquire a connection, run one command and release it
    ///
    /// The connection is released as unhealthy when the failure means the
    /// session is gone.
    #[tracing::instrument(skip(self, command), level = "debug")]
    pub async fn run_command(&self, host_id: &str, command: &str) -> PoolResult<CommandOutput> {
        let connection = self.acquire(host_id).await?;

        match connection.exec(command).await {
            Ok(output) => {
                connection.release();
                Ok(output)
            }
            Err(err) => {
                tracing::warn!(error = %err, "command failed");
                if err.is_connection_lost() {
                    connection.release_unhealthy();
                } else {
                    connection.release();
                }
                Err(err.into())
            }
        }
    }

    /// Pre-establish `max(1, min)` idle connections to one host
    ///
    /// Returns the number of connections created.
    #[tracing::instrument(skip(self))]
    pub async fn warm_up(&self, host_id: &str) -> PoolResult<usize> {
        if self.is_shut_down() {
            return Err(PoolError::PoolShuttingDown);
        }
        let pool = self.pool(host_id)?;
        let created = pool.warm_up().await?;
        tracing::info!(created, "host warmed up");
        Ok(created)
    }

    /// Warm up every registered host concurrently
    ///
    /// A failing host does not stop the others; results are ordered by host id.
    pub async fn warm_up_all(&self) -> Vec<(String, PoolResult<usize>)> {
        let ids = self.host_ids();
        let results = join_all(ids.iter().map(|id| self.warm_up(id))).await;
        ids.into_iter().zip(results).collect()
    }

    /// Status of the manager and every registered host
    pub fn pool_status(&self) -> PoolStatus {
        let mut pools = self.inner.pools();
        pools.sort_by(|a, b| a.host_id().cmp(b.host_id()));

        let hosts = pools
            .iter()
            .map(|pool| {
                let gauges = pool.gauges();
                let health = pool.health();
                HostStatus {
                    id: pool.host_id().to_string(),
                    name: pool.host().display_name().to_string(),
                    healthy: health.is_healthy(),
                    idle_count: gauges.idle,
                    active_count: gauges.active,
                    total_count: gauges.total,
                    waiting: gauges.waiting,
                    last_error: health.last_error().map(str::to_string),
                }
            })
            .collect();

        PoolStatus {
            initialized: self.is_initialized(),
            hosts,
        }
    }

    /// Statistics of one host
    pub fn stats(&self, host_id: &str) -> PoolResult<HostStats> {
        Ok(self.pool(host_id)?.stats())
    }

    /// Statistics of every host, ordered by host id
    pub fn all_stats(&self) -> Vec<HostStats> {
        let mut stats: Vec<HostStats> = self.inner.pools().iter().map(|pool| pool.stats()).collect();
        stats.sort_by(|a, b| a.host_id().cmp(b.host_id()));
        stats
    }

    /// Subscribe to pool lifecycle events
    pub fn subscribe(&self) -> broadcast::Receiver<PoolEvent> {
        self.inner.ctx.events.subscribe()
    }

    /// Whether a connection has succeeded since construction and no shutdown happened
    pub fn is_initialized(&self) -> bool {
        !self.is_shut_down() && self.inner.ctx.initialized.load(Ordering::Acquire)
    }

    /// Whether `shutdown` has been called
    pub fn is_shut_down(&self) -> bool {
        self.inner.ctx.shutting_down.load(Ordering::Acquire)
    }

    /// Close idle connections past the idle timeout; returns how many closed
    pub fn sweep_idle_connections(&self) -> usize {
        self.inner.sweep_idle()
    }

    /// Probe every idle connection; returns how many probes failed
    pub async fn run_health_checks(&self) -> usize {
        self.inner.probe(ProbeKind::HealthCheck).await
    }

    /// Probe idle connections quiet for a keep-alive interval; returns how many failed
    pub async fn run_keep_alive(&self) -> usize {
        self.inner.probe(ProbeKind::KeepAlive).await
    }

    /// Top every warm host back up to its idle minimum
    pub fn maintain_minimum(&self) {
        self.inner.maintain_minimum();
    }

    /// Shut the manager down
    ///
    /// Stops the timers, fails queued callers with `PoolShuttingDown` and
    /// closes every connection. Calling it again is a no-op.
    #[tracing::instrument(skip(self))]
    pub async fn shutdown(&self) {
        if self.inner.ctx.shutting_down.swap(true, Ordering::AcqRel) {
            tracing::debug!("connection pool already shut down");
            return;
        }
        tracing::info!("shutting down connection pool");

        self.inner.cancel.cancel();
        let scheduler = self.inner.scheduler.lock().take();
        if let Some(task) = scheduler
            && let Err(e) = task.await
            && !e.is_cancelled()
        {
            tracing::warn!(error = %e, "pool scheduler ended abnormally");
        }

        let pools = self.inner.pools();
        join_all(pools.iter().map(|pool| pool.close(DestroyReason::Shutdown))).await;

        self.inner.ctx.initialized.store(false, Ordering::Release);
        tracing::info!(hosts = pools.len(), "connection pool shut down");
    }

    fn ensure_scheduler(&self) {
        let mut scheduler = self.inner.scheduler.lock();
        if scheduler.is_some() {
            return;
        }
        let Ok(handle) = Handle::try_current() else {
            tracing::debug!("no tokio runtime, background maintenance not started");
            return;
        };
        *scheduler = scheduler::spawn(
            &handle,
            &self.inner.ctx.config,
            Arc::downgrade(&self.inner),
            self.inner.cancel.clone(),
        );
    }
}

impl std::fmt::Debug for ConnectionPoolManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPoolManager")
            .field("transport", &self.inner.ctx.transport.name())
            .field("hosts", &self.host_ids())
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}
