//! Terminal tables for pool state and command results

use std::time::Duration;

use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, Color, ContentArrangement, Table};
use fleetdeck_core::CommandOutput;
use fleetdeck_pool::{HostStats, PoolResult, PoolStatus};

const SUMMARY_WIDTH: usize = 60;

fn table(header: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header.to_vec());
    table
}

fn health_cell(healthy: bool) -> Cell {
    if healthy {
        Cell::new("healthy").fg(Color::Green)
    } else {
        Cell::new("unhealthy").fg(Color::Red)
    }
}

pub fn status_table(status: &PoolStatus) -> Table {
    let mut table = table(&[
        "Host", "Name", "Health", "Idle", "Active", "Total", "Waiting", "Last error",
    ]);
    for host in &status.hosts {
        table.add_row(vec![
            Cell::new(&host.id),
            Cell::new(&host.name),
            health_cell(host.healthy),
            Cell::new(host.idle_count),
            Cell::new(host.active_count),
            Cell::new(host.total_count),
            Cell::new(host.waiting),
            Cell::new(host.last_error.as_deref().unwrap_or("-")),
        ]);
    }
    table
}

pub fn stats_table(stats: &[HostStats]) -> Table {
    let mut table = table(&[
        "Host",
        "Total",
        "Active",
        "Idle",
        "Waiting",
        "Borrows",
        "Returns",
        "Reused",
        "Created",
        "Destroyed",
        "Errors",
        "Timeouts",
        "Utilization",
    ]);
    for host in stats {
        table.add_row(vec![
            Cell::new(host.host_id()),
            Cell::new(host.total_connections()),
            Cell::new(host.active_connections()),
            Cell::new(host.idle_connections()),
            Cell::new(host.waiting()),
            Cell::new(host.total_borrows()),
            Cell::new(host.total_returns()),
            Cell::new(host.saved_reconnections()),
            Cell::new(host.total_created()),
            Cell::new(host.total_destroyed()),
            Cell::new(host.total_errors()),
            Cell::new(host.acquire_timeouts()),
            Cell::new(format!("{:.0}%", host.utilization() * 100.0)),
        ]);
    }
    table
}

/// One row per host: exit status and the first line of output or the error
pub fn results_table(results: &[(String, PoolResult<CommandOutput>, Duration)]) -> Table {
    let mut table = table(&["Host", "Exit", "Latency", "Output"]);
    for (host_id, result, latency) in results {
        let row = match result {
            Ok(output) => {
                let text = if output.stdout.is_empty() {
                    output.stderr_lossy()
                } else {
                    output.stdout_lossy()
                };
                let exit = Cell::new(output.exit_status).fg(if output.success() {
                    Color::Green
                } else {
                    Color::Yellow
                });
                vec![
                    Cell::new(host_id),
                    exit,
                    Cell::new(format_latency(*latency)),
                    Cell::new(summarize(&text, SUMMARY_WIDTH)),
                ]
            }
            Err(e) => vec![
                Cell::new(host_id),
                Cell::new("error").fg(Color::Red),
                Cell::new(format_latency(*latency)),
                Cell::new(summarize(&e.to_string(), SUMMARY_WIDTH)),
            ],
        };
        table.add_row(row);
    }
    table
}

/// First non-blank line, cut to `width` characters
pub fn summarize(text: &str, width: usize) -> String {
    let line = text
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or("");
    if line.chars().count() <= width {
        return line.to_string();
    }
    let mut cut: String = line.chars().take(width.saturating_sub(3)).collect();
    cut.push_str("...");
    cut
}

pub fn format_latency(latency: Duration) -> String {
    if latency < Duration::from_secs(1) {
        format!("{} ms", latency.as_millis())
    } else {
        format!("{:.1} s", latency.as_secs_f64())
    }
}

#[cfg(test)]
mod tests;
