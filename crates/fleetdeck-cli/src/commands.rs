//! Subcommand handlers
//!
//! Each handler writes its report to the given writer and returns the
//! process exit code. Callers shut the manager down afterwards.

use std::io::Write;
use std::time::Duration;

use fleetdeck_core::CommandOutput;
use fleetdeck_pool::{ConnectionPoolManager, PoolResult};
use futures::future::join_all;
use serde::Serialize;
use tokio::time::{Instant, MissedTickBehavior};

use crate::output;

pub const EXIT_OK: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;

/// Result of one command on one host, with the time spent acquiring and running it
pub type HostResult = (String, PoolResult<CommandOutput>, Duration);

#[derive(Debug, Serialize)]
struct ResultRecord<'a> {
    host: &'a str,
    latency_ms: u128,
    #[serde(skip_serializing_if = "Option::is_none")]
    exit_status: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stdout: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stderr: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<'a> ResultRecord<'a> {
    fn new((host, result, latency): &'a HostResult) -> Self {
        let mut record = Self {
            host,
            latency_ms: latency.as_millis(),
            exit_status: None,
            stdout: None,
            stderr: None,
            error: None,
        };
        match result {
            Ok(output) => {
                record.exit_status = Some(output.exit_status);
                record.stdout = Some(output.stdout_lossy().into_owned());
                record.stderr = Some(output.stderr_lossy().into_owned());
            }
            Err(e) => record.error = Some(e.to_string()),
        }
        record
    }
}

/// Warm every host, then print the pool status
pub async fn status(
    manager: &ConnectionPoolManager,
    json: bool,
    out: &mut impl Write,
) -> anyhow::Result<u8> {
    let mut failed = 0;
    for (host_id, result) in manager.warm_up_all().await {
        if let Err(e) = result {
            tracing::warn!(host = %host_id, error = %e, "warm-up failed");
            failed += 1;
        }
    }

    let status = manager.pool_status();
    if json {
        serde_json::to_writer_pretty(&mut *out, &status)?;
        writeln!(out)?;
    } else {
        writeln!(out, "{}", output::status_table(&status))?;
    }

    Ok(if failed == 0 { EXIT_OK } else { EXIT_FAILURE })
}

/// Print per-host statistics without opening any connection
pub fn stats(manager: &ConnectionPoolManager, json: bool, out: &mut impl Write) -> anyhow::Result<u8> {
    let stats = manager.all_stats();
    if json {
        serde_json::to_writer_pretty(&mut *out, &stats)?;
        writeln!(out)?;
    } else {
        writeln!(out, "{}", output::stats_table(&stats))?;
    }
    Ok(EXIT_OK)
}

/// Run one command on one host, passing its output through
pub async fn run(
    manager: &ConnectionPoolManager,
    host_id: &str,
    command: &str,
    out: &mut impl Write,
    err: &mut impl Write,
) -> anyhow::Result<u8> {
    let output = manager.run_command(host_id, command).await?;
    out.write_all(&output.stdout)?;
    err.write_all(&output.stderr)?;
    out.flush()?;
    Ok(exit_code(output.exit_status))
}

/// Run one command on every host concurrently
pub async fn broadcast(
    manager: &ConnectionPoolManager,
    command: &str,
    json: bool,
    out: &mut impl Write,
) -> anyhow::Result<u8> {
    let results = fan_out(manager, command).await;
    write_results(&results, json, out)?;

    let all_ok = results
        .iter()
        .all(|(_, result, _)| matches!(result, Ok(output) if output.success()));
    Ok(if all_ok { EXIT_OK } else { EXIT_FAILURE })
}

/// Options for [`watch`]
#[derive(Debug, Clone)]
pub struct WatchOptions {
    pub command: String,
    pub interval: Duration,
    /// Stop after this many rounds; run until interrupted when `None`
    pub rounds: Option<u64>,
    pub json: bool,
}

/// Poll every host on an interval until interrupted
pub async fn watch(
    manager: &ConnectionPoolManager,
    options: &WatchOptions,
    out: &mut impl Write,
) -> anyhow::Result<u8> {
    let mut ticker = tokio::time::interval(options.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let mut round = 0u64;
    loop {
        if options.rounds.is_some_and(|limit| round >= limit) {
            break;
        }

        tokio::select! {
            _ = &mut ctrl_c => {
                tracing::info!(rounds = round, "watch interrupted");
                break;
            }
            _ = ticker.tick() => {
                round += 1;
                let results = fan_out(manager, &options.command).await;
                if !options.json {
                    writeln!(
                        out,
                        "[{}] round {round}",
                        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
                    )?;
                }
                write_results(&results, options.json, out)?;
                if !options.json {
                    writeln!(out, "{}", output::stats_table(&manager.all_stats()))?;
                }
                out.flush()?;
            }
        }
    }

    Ok(EXIT_OK)
}

async fn fan_out(manager: &ConnectionPoolManager, command: &str) -> Vec<HostResult> {
    let host_ids = manager.host_ids();
    let runs = host_ids.iter().map(|host_id| async move {
        let started = Instant::now();
        let result = manager.run_command(host_id, command).await;
        (host_id.clone(), result, started.elapsed())
    });
    join_all(runs).await
}

fn write_results(results: &[HostResult], json: bool, out: &mut impl Write) -> anyhow::Result<()> {
    if json {
        for result in results {
            serde_json::to_writer(&mut *out, &ResultRecord::new(result))?;
            writeln!(out)?;
        }
    } else {
        writeln!(out, "{}", output::results_table(results))?;
    }
    Ok(())
}

/// Map a remote exit status onto a local process exit code
pub fn exit_code(status: i32) -> u8 {
    match u8::try_from(status) {
        Ok(code) => code,
        Err(_) => EXIT_FAILURE,
    }
}
