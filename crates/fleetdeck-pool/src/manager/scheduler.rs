//! Shared maintenance timers
//!
//! One task per manager drives the idle sweep, keep-alive probes and health
//! checks for every host. It holds only a weak reference to the manager and
//! stops on cancellation or once the manager is gone.
//!
//! Probe passes run in their own tasks so a host whose probes hang until the
//! probe timeout never delays the sweep or shutdown. A tick that finds the
//! previous pass of its kind still running is skipped.

use std::sync::Weak;
use std::time::Duration;

use futures::future::join_all;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{Interval, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;

use super::ManagerInner;
use crate::PoolConfig;
use crate::health::ProbeKind;

struct Timers {
    sweep: Option<Interval>,
    keep_alive: Option<Interval>,
    health: Option<Interval>,
}

impl Timers {
    fn from_config(config: &PoolConfig) -> Option<Self> {
        let timers = Self {
            sweep: config.idle_sweep_interval().map(timer),
            keep_alive: config.keep_alive_interval().map(timer),
            health: config.health_check_interval().map(timer),
        };
        (timers.sweep.is_some() || timers.keep_alive.is_some() || timers.health.is_some())
            .then_some(timers)
    }
}

/// Interval whose first tick is one period away
fn timer(period: Duration) -> Interval {
    let mut interval = interval_at(tokio::time::Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

async fn tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

/// At most one probe pass of a kind in flight
struct ProbePass {
    kind: ProbeKind,
    running: Option<JoinHandle<()>>,
}

impl ProbePass {
    fn new(kind: ProbeKind) -> Self {
        Self {
            kind,
            running: None,
        }
    }

    fn start(&mut self, manager: &ManagerInner) {
        if self.running.as_ref().is_some_and(|task| !task.is_finished()) {
            tracing::debug!(kind = ?self.kind, "previous probe pass still running, skipping tick");
            return;
        }

        let kind = self.kind;
        let pools = manager.pools();
        self.running = Some(tokio::spawn(async move {
            let failed: usize = join_all(pools.iter().map(|pool| pool.probe_idle(kind)))
                .await
                .into_iter()
                .sum();
            if failed > 0 {
                tracing::warn!(?kind, failed, "probes failed");
            }
        }));
    }
}

/// Start the maintenance task; `None` when every timer is disabled
pub(super) fn spawn(
    handle: &Handle,
    config: &PoolConfig,
    manager: Weak<ManagerInner>,
    cancel: CancellationToken,
) -> Option<JoinHandle<()>> {
    let timers = Timers::from_config(config)?;
    tracing::debug!(
        sweep = timers.sweep.is_some(),
        keep_alive = timers.keep_alive.is_some(),
        health = timers.health.is_some(),
        "starting pool scheduler"
    );
    Some(handle.spawn(run(timers, manager, cancel)))
}

async fn run(mut timers: Timers, manager: Weak<ManagerInner>, cancel: CancellationToken) {
    let mut keep_alive = ProbePass::new(ProbeKind::KeepAlive);
    let mut health = ProbePass::new(ProbeKind::HealthCheck);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tick(&mut timers.sweep) => {
                let Some(manager) = manager.upgrade() else { break };
                let evicted = manager.sweep_idle();
                manager.maintain_minimum();
                if evicted > 0 {
                    tracing::debug!(evicted, "idle sweep");
                }
            }
            _ = tick(&mut timers.keep_alive) => {
                let Some(manager) = manager.upgrade() else { break };
                keep_alive.start(&manager);
            }
            _ = tick(&mut timers.health) => {
                let Some(manager) = manager.upgrade() else { break };
                health.start(&manager);
            }
        }
    }
    // In-flight passes are left to finish: a probed connection is returned
    // or destroyed by its pass, and a closed pool destroys it
    tracing::debug!("pool scheduler stopped");
}
