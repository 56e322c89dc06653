//! Tests for the per-host pool

use super::*;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use pretty_assertions::assert_eq;

use crate::health::ProbeKind;
use crate::test_support::{FakeTransport, host, quiet_config};
use crate::{DestroyReason, PoolConfig, PoolError, PoolResult};

fn host_pool(config: PoolConfig) -> (Arc<HostPool>, Arc<FakeTransport>) {
    let transport = FakeTransport::new();
    let ctx = Arc::new(PoolContext::new(config, transport.clone()));
    (HostPool::new(host("alpha"), ctx), transport)
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

const WAIT: Duration = Duration::from_secs(5);

mod acquire_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test(start_paused = true)]
    async fn test_fresh_pool_stats_are_zero() {
        let (pool, transport) = host_pool(quiet_config(1, 4));
        let stats = pool.stats();

        assert_eq!(stats, HostStats::empty("alpha"));
        assert_eq!(transport.attempts(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_released_connection_is_reused() {
        let (pool, transport) = host_pool(quiet_config(1, 4));

        let first = pool.acquire(WAIT).await.unwrap();
        let first_id = first.id();
        assert_eq!(first.use_count(), 1);
        first.release();

        let second = pool.acquire(WAIT).await.unwrap();
        assert_eq!(second.id(), first_id);
        assert_eq!(second.use_count(), 2);
        assert_eq!(transport.attempts(), 1);
        second.release();

        let stats = pool.stats();
        assert_eq!(stats.total_borrows(), 2);
        assert_eq!(stats.total_returns(), 2);
        assert_eq!(stats.saved_reconnections(), 1);
        assert_eq!(stats.total_created(), 1);
        assert_eq!(stats.idle_connections(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_connection_returns_to_pool() {
        let (pool, _transport) = host_pool(quiet_config(1, 4));

        {
            let conn = pool.acquire(WAIT).await.unwrap();
            assert_eq!(conn.host_id(), "alpha");
        }

        let stats = pool.stats();
        assert_eq!(stats.idle_connections(), 1);
        assert_eq!(stats.active_connections(), 0);
        assert_eq!(stats.total_returns(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exec_on_borrowed_connection() {
        let (pool, transport) = host_pool(quiet_config(1, 4));

        let conn = pool.acquire(WAIT).await.unwrap();
        let output = conn.exec("nvidia-smi -L").await.unwrap();
        assert_eq!(output.stdout_lossy(), "nvidia-smi -L\n");
        assert_eq!(transport.session(0).exec_count(), 1);

        // Exec alone does not change bookkeeping
        assert_eq!(pool.stats().total_returns(), 0);
        conn.release();
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_idle_session_is_discarded() {
        let (pool, transport) = host_pool(quiet_config(0, 4));

        let conn = pool.acquire(WAIT).await.unwrap();
        let stale_id = conn.id();
        conn.release();
        transport.session(0).drop_transport();

        let conn = pool.acquire(WAIT).await.unwrap();
        assert_ne!(conn.id(), stale_id);
        assert_eq!(transport.created(), 2);
        assert_eq!(pool.stats().total_destroyed(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_failure_reports_every_attempt() {
        let (pool, transport) = host_pool(quiet_config(1, 4).with_max_retries(2));
        transport.set_always_fail(true);

        let err = pool.acquire(WAIT).await.unwrap_err();
        match err {
            PoolError::ConnectFailed {
                host_id, attempts, ..
            } => {
                assert_eq!(host_id, "alpha");
                assert_eq!(attempts, 3);
            }
            other => panic!("expected ConnectFailed, got {:?}", other),
        }
        assert_eq!(transport.attempts(), 3);

        let stats = pool.stats();
        assert_eq!(stats.total_connections(), 0);
        assert_eq!(stats.total_errors(), 3);
        assert!(!pool.health().is_healthy());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_connect_frees_its_slot() {
        let (pool, transport) = host_pool(quiet_config(0, 1).with_max_retries(1));
        transport.fail_next(2);

        assert!(pool.acquire(WAIT).await.is_err());
        let conn = pool.acquire(WAIT).await.unwrap();
        assert_eq!(pool.stats().total_connections(), 1);
        assert!(pool.health().is_healthy());
        conn.release();
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_connect_hits_hard_ceiling() {
        let (pool, transport) = host_pool(
            quiet_config(0, 1)
                .with_max_retries(0)
                .with_connection_timeout_ms(200),
        );
        transport.set_connect_delay(Duration::from_secs(60));

        let err = pool.acquire(WAIT).await.unwrap_err();
        let PoolError::ConnectFailed { last_error, .. } = err else {
            panic!("expected ConnectFailed");
        };
        assert!(last_error.is_connection_lost());
        assert_eq!(pool.stats().total_connections(), 0);
    }
}

mod waiter_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test(start_paused = true)]
    async fn test_waiters_are_served_in_arrival_order() {
        let (pool, transport) = host_pool(quiet_config(0, 1));
        let held = pool.acquire(WAIT).await.unwrap();
        let order = Arc::new(Mutex::new(Vec::new()));

        let mut tasks = Vec::new();
        for n in 1..=3 {
            let pool = Arc::clone(&pool);
            let order = Arc::clone(&order);
            tasks.push(tokio::spawn(async move {
                let conn = pool.acquire(WAIT).await.unwrap();
                order.lock().push(n);
                tokio::time::sleep(Duration::from_millis(10)).await;
                conn.release();
            }));
            settle().await;
        }
        assert_eq!(pool.stats().waiting(), 3);

        held.release();
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(*order.lock(), vec![1, 2, 3]);
        assert_eq!(transport.created(), 1);
        // One session was handed along the whole queue
        assert_eq!(pool.stats().saved_reconnections(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_timeout_leaves_connections_unchanged() {
        let (pool, _transport) = host_pool(quiet_config(0, 1));
        let held = pool.acquire(WAIT).await.unwrap();

        let err = pool.acquire(Duration::from_millis(50)).await.unwrap_err();
        assert!(err.is_timeout());
        match err {
            PoolError::AcquireTimeout { host_id, timeout } => {
                assert_eq!(host_id, "alpha");
                assert_eq!(timeout, Duration::from_millis(50));
            }
            other => panic!("expected AcquireTimeout, got {:?}", other),
        }

        let stats = pool.stats();
        assert_eq!(stats.total_connections(), 1);
        assert_eq!(stats.waiting(), 0);
        assert_eq!(stats.acquire_timeouts(), 1);
        held.release();
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_waiter_leaves_queue() {
        let (pool, _transport) = host_pool(quiet_config(0, 1));
        let held = pool.acquire(WAIT).await.unwrap();

        let waiting = {
            let pool = Arc::clone(&pool);
            tokio::spawn(async move { pool.acquire(WAIT).await })
        };
        settle().await;
        assert_eq!(pool.stats().waiting(), 1);

        waiting.abort();
        settle().await;
        assert_eq!(pool.stats().waiting(), 0);

        held.release();
        assert_eq!(pool.stats().idle_connections(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unhealthy_release_replaces_for_waiter() {
        let (pool, transport) = host_pool(quiet_config(0, 1));
        let held = pool.acquire(WAIT).await.unwrap();

        let waiting = {
            let pool = Arc::clone(&pool);
            tokio::spawn(async move { pool.acquire(WAIT).await.map(|conn| conn.id()) })
        };
        settle().await;

        let broken_id = held.id();
        held.release_unhealthy();

        let served_id = waiting.await.unwrap().unwrap();
        assert_ne!(served_id, broken_id);
        assert_eq!(transport.created(), 2);
        settle().await;
        assert!(transport.session(0).is_closed());

        let stats = pool.stats();
        assert_eq!(stats.total_destroyed(), 1);
        assert_eq!(stats.total_connections(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_release_at_timeout_instant_serves_once() {
        let (pool, _transport) = host_pool(quiet_config(0, 1));
        let held = pool.acquire(WAIT).await.unwrap();

        let waiting = {
            let pool = Arc::clone(&pool);
            tokio::spawn(async move { pool.acquire(Duration::from_millis(50)).await })
        };
        settle().await;

        // Both timers are due at the same instant
        tokio::time::sleep(Duration::from_millis(50)).await;
        held.release();
        let result = waiting.await.unwrap();
        assert_served_once(&pool, result, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_release_racing_timeout_never_double_serves() {
        let (pool, _transport) = host_pool(quiet_config(0, 1));

        for _ in 0..40 {
            let held = pool.acquire(WAIT).await.unwrap();
            let timeouts_before = pool.stats().acquire_timeouts();

            let waiting = {
                let pool = Arc::clone(&pool);
                tokio::spawn(async move { pool.acquire(Duration::from_millis(3)).await })
            };
            tokio::time::sleep(Duration::from_millis(3)).await;
            held.release();

            let result = waiting.await.unwrap();
            assert_served_once(&pool, result, timeouts_before);
        }
    }

    /// The freed session went to exactly one place: the waiter or the idle deque
    fn assert_served_once(
        pool: &Arc<HostPool>,
        result: PoolResult<PooledConnection>,
        timeouts_before: u64,
    ) {
        let stats = pool.stats();
        assert_eq!(stats.total_connections(), 1);
        assert_eq!(stats.waiting(), 0);
        match result {
            Ok(conn) => {
                assert_eq!(stats.idle_connections(), 0);
                assert_eq!(stats.active_connections(), 1);
                assert_eq!(stats.acquire_timeouts(), timeouts_before);
                conn.release();
            }
            Err(PoolError::AcquireTimeout { .. }) => {
                assert_eq!(stats.idle_connections(), 1);
                assert_eq!(stats.active_connections(), 0);
                assert_eq!(stats.acquire_timeouts(), timeouts_before + 1);
            }
            Err(other) => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(pool.stats().idle_connections(), 1);
    }
}

mod maintenance_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    async fn fill(pool: &Arc<HostPool>, count: usize) {
        let mut held = Vec::new();
        for _ in 0..count {
            held.push(pool.acquire(WAIT).await.unwrap());
        }
        for conn in held {
            conn.release();
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_sweep_respects_minimum() {
        let (pool, transport) = host_pool(quiet_config(1, 3).with_idle_timeout_ms(100));
        fill(&pool, 3).await;
        assert_eq!(pool.stats().idle_connections(), 3);

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(pool.sweep_idle(), 2);

        let stats = pool.stats();
        assert_eq!(stats.total_connections(), 1);
        assert_eq!(stats.total_destroyed(), 2);
        settle().await;
        assert_eq!(transport.live(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_sweep_keeps_recent_connections() {
        let (pool, _transport) = host_pool(quiet_config(0, 2).with_idle_timeout_ms(100));
        fill(&pool, 2).await;

        tokio::time::sleep(Duration::from_millis(150)).await;
        let conn = pool.acquire(WAIT).await.unwrap();
        conn.release();

        assert_eq!(pool.sweep_idle(), 1);
        assert_eq!(pool.stats().idle_connections(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_health_check_replaces_failed_connection() {
        let (pool, transport) = host_pool(quiet_config(2, 3));
        fill(&pool, 2).await;
        transport.session(0).break_session();

        assert_eq!(pool.probe_idle(ProbeKind::HealthCheck).await, 1);
        let stats = pool.stats();
        assert_eq!(stats.probe_failures(), 1);
        assert_eq!(stats.total_destroyed(), 1);

        settle().await;
        let stats = pool.stats();
        assert_eq!(stats.idle_connections(), 2);
        assert_eq!(stats.total_created(), 3);
        assert!(transport.session(0).is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_probes_skip_borrowed_connections() {
        let (pool, transport) = host_pool(quiet_config(0, 2));
        let held = pool.acquire(WAIT).await.unwrap();

        assert_eq!(pool.probe_idle(ProbeKind::HealthCheck).await, 0);
        assert_eq!(transport.session(0).exec_count(), 0);
        held.release();
    }

    #[tokio::test(start_paused = true)]
    async fn test_keep_alive_probes_only_quiet_connections() {
        let (pool, transport) = host_pool(quiet_config(0, 2).with_keep_alive_interval_ms(100));
        fill(&pool, 2).await;

        tokio::time::sleep(Duration::from_millis(150)).await;
        // Most recently parked session is reused first
        let conn = pool.acquire(WAIT).await.unwrap();
        conn.release();

        assert_eq!(pool.probe_idle(ProbeKind::KeepAlive).await, 0);
        assert_eq!(transport.session(0).exec_count(), 1);
        assert_eq!(transport.session(1).exec_count(), 0);

        // A successful probe counts as activity for the next round
        assert_eq!(pool.probe_idle(ProbeKind::KeepAlive).await, 0);
        assert_eq!(transport.session(0).exec_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_keep_alive_failure_destroys_connection() {
        let (pool, transport) = host_pool(quiet_config(0, 2).with_keep_alive_interval_ms(100));
        fill(&pool, 1).await;
        transport.session(0).break_session();

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(pool.probe_idle(ProbeKind::KeepAlive).await, 1);
        assert_eq!(pool.stats().total_connections(), 0);
        assert_eq!(
            pool.health().last_error(),
            Some("Keep-alive failed: Probe command failed: Connection error: broken pipe")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_warm_up_creates_minimum() {
        let (pool, transport) = host_pool(quiet_config(2, 4));

        assert_eq!(pool.warm_up().await.unwrap(), 2);
        assert_eq!(pool.stats().idle_connections(), 2);
        assert_eq!(pool.warm_up().await.unwrap(), 0);
        assert_eq!(transport.created(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_warm_up_creates_at_least_one() {
        let (pool, _transport) = host_pool(quiet_config(0, 4));
        assert_eq!(pool.warm_up().await.unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_minimum_not_rebuilt_before_first_connect() {
        let (pool, transport) = host_pool(quiet_config(2, 4));
        pool.maintain_minimum();
        settle().await;
        assert_eq!(transport.attempts(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_maintain_minimum_after_warm() {
        let (pool, transport) = host_pool(quiet_config(2, 4));
        let conn = pool.acquire(WAIT).await.unwrap();

        pool.maintain_minimum();
        settle().await;
        assert_eq!(pool.stats().idle_connections(), 2);
        assert_eq!(transport.created(), 3);
        conn.release();
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_during_probe_waits_instead_of_dialing() {
        let (pool, transport) = host_pool(quiet_config(0, 2));
        fill(&pool, 1).await;
        transport.session(0).set_exec_delay(Duration::from_millis(50));

        let probing = {
            let pool = Arc::clone(&pool);
            tokio::spawn(async move { pool.probe_idle(ProbeKind::HealthCheck).await })
        };
        settle().await;

        let stats = pool.stats();
        assert_eq!(stats.idle_connections(), 0);
        assert_eq!(stats.total_connections(), 1);

        let conn = pool.acquire(WAIT).await.unwrap();
        assert_eq!(conn.use_count(), 2);
        assert_eq!(transport.attempts(), 1);
        assert_eq!(probing.await.unwrap(), 0);

        let stats = pool.stats();
        assert_eq!(stats.total_connections(), 1);
        assert_eq!(stats.saved_reconnections(), 1);
        conn.release();
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_at_capacity_gets_probed_connection() {
        let (pool, transport) = host_pool(quiet_config(0, 1));
        fill(&pool, 1).await;
        transport.session(0).set_exec_delay(Duration::from_millis(90));

        let probing = {
            let pool = Arc::clone(&pool);
            tokio::spawn(async move { pool.probe_idle(ProbeKind::HealthCheck).await })
        };
        settle().await;

        let conn = pool.acquire(Duration::from_millis(150)).await.unwrap();
        assert_eq!(probing.await.unwrap(), 0);
        assert_eq!(pool.stats().acquire_timeouts(), 0);
        assert_eq!(transport.attempts(), 1);
        conn.release();
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_probe_replaces_for_queued_caller() {
        let (pool, transport) = host_pool(quiet_config(0, 1));
        fill(&pool, 1).await;
        transport.session(0).set_exec_delay(Duration::from_millis(20));
        transport.session(0).break_session();

        let probing = {
            let pool = Arc::clone(&pool);
            tokio::spawn(async move { pool.probe_idle(ProbeKind::HealthCheck).await })
        };
        settle().await;

        let conn = pool.acquire(WAIT).await.unwrap();
        assert_eq!(probing.await.unwrap(), 1);
        assert_eq!(conn.use_count(), 1);
        assert_eq!(transport.created(), 2);
        assert_eq!(pool.stats().total_connections(), 1);
        conn.release();
    }
}

mod close_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test(start_paused = true)]
    async fn test_close_during_probe_destroys_probed_session() {
        let (pool, transport) = host_pool(quiet_config(0, 1));
        pool.warm_up().await.unwrap();
        transport.session(0).set_exec_delay(Duration::from_millis(50));

        let probing = {
            let pool = Arc::clone(&pool);
            tokio::spawn(async move { pool.probe_idle(ProbeKind::HealthCheck).await })
        };
        settle().await;

        pool.close(DestroyReason::Shutdown).await;
        assert!(transport.session(0).is_closed());
        probing.await.unwrap();

        let stats = pool.stats();
        assert_eq!(stats.total_connections(), 0);
        assert_eq!(stats.total_destroyed(), 1);
        assert_eq!(stats.probe_failures(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_fails_waiters_and_closes_sessions() {
        let (pool, transport) = host_pool(quiet_config(0, 2));
        let active = pool.acquire(WAIT).await.unwrap();
        let idle = pool.acquire(WAIT).await.unwrap();
        idle.release();
        // Fill the slot again so the next caller queues
        let second = pool.acquire(WAIT).await.unwrap();
        let waiting = {
            let pool = Arc::clone(&pool);
            tokio::spawn(async move { pool.acquire(WAIT).await })
        };
        settle().await;

        second.release();
        let handed = waiting.await.unwrap().unwrap();

        let queued = {
            let pool = Arc::clone(&pool);
            tokio::spawn(async move { pool.acquire(WAIT).await })
        };
        settle().await;

        pool.close(DestroyReason::Shutdown).await;
        assert!(matches!(
            queued.await.unwrap(),
            Err(PoolError::PoolShuttingDown)
        ));
        assert_eq!(transport.live(), 0);

        assert!(matches!(
            pool.acquire(WAIT).await,
            Err(PoolError::PoolShuttingDown)
        ));

        active.release();
        handed.release();
        let stats = pool.stats();
        assert_eq!(stats.total_connections(), 0);
        assert_eq!(stats.total_destroyed(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_is_idempotent() {
        let (pool, _transport) = host_pool(quiet_config(0, 2));
        pool.warm_up().await.unwrap();

        pool.close(DestroyReason::Shutdown).await;
        pool.close(DestroyReason::Shutdown).await;
        assert_eq!(pool.stats().total_destroyed(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_finishing_after_close_is_discarded() {
        let (pool, transport) = host_pool(quiet_config(0, 1));
        transport.set_connect_delay(Duration::from_millis(100));

        let connecting = {
            let pool = Arc::clone(&pool);
            tokio::spawn(async move { pool.acquire(WAIT).await })
        };
        settle().await;
        pool.close(DestroyReason::Shutdown).await;

        assert!(matches!(
            connecting.await.unwrap(),
            Err(PoolError::PoolShuttingDown)
        ));
        settle().await;
        assert_eq!(transport.live(), 0);
        assert_eq!(pool.stats().total_connections(), 0);
    }
}
