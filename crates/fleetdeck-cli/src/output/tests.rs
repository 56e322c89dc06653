use pretty_assertions::assert_eq;

use fleetdeck_pool::{HostStatus, PoolError};

use super::*;

#[test]
fn test_summarize_takes_first_non_blank_line() {
    assert_eq!(summarize("\n  \n  GPU 0: A100  \nGPU 1: A100\n", 60), "GPU 0: A100");
    assert_eq!(summarize("", 60), "");
}

#[test]
fn test_summarize_truncates_long_lines() {
    let line = "x".repeat(100);
    let summary = summarize(&line, 10);
    assert_eq!(summary, "xxxxxxx...");
    assert_eq!(summary.chars().count(), 10);
}

#[test]
fn test_format_latency() {
    assert_eq!(format_latency(Duration::from_millis(42)), "42 ms");
    assert_eq!(format_latency(Duration::from_millis(1500)), "1.5 s");
}

#[test]
fn test_status_table_lists_hosts() {
    let status = PoolStatus {
        initialized: true,
        hosts: vec![
            HostStatus {
                id: "gpu-01".to_string(),
                name: "Rack A".to_string(),
                healthy: true,
                idle_count: 2,
                active_count: 1,
                total_count: 3,
                waiting: 0,
                last_error: None,
            },
            HostStatus {
                id: "gpu-02".to_string(),
                name: "gpu-02".to_string(),
                healthy: false,
                idle_count: 0,
                active_count: 0,
                total_count: 0,
                waiting: 0,
                last_error: Some("connection refused".to_string()),
            },
        ],
    };

    let rendered = status_table(&status).to_string();
    assert!(rendered.contains("gpu-01"));
    assert!(rendered.contains("Rack A"));
    assert!(rendered.contains("unhealthy"));
    assert!(rendered.contains("connection refused"));
}

#[test]
fn test_stats_table_shows_utilization() {
    let rendered = stats_table(&[HostStats::empty("gpu-01")]).to_string();
    assert!(rendered.contains("gpu-01"));
    assert!(rendered.contains("0%"));
}

#[test]
fn test_results_table_shows_output_and_errors() {
    let results = vec![
        (
            "gpu-01".to_string(),
            Ok(CommandOutput::new("87 %, 30000 MiB\n", "", 0)),
            Duration::from_millis(12),
        ),
        (
            "gpu-02".to_string(),
            Ok(CommandOutput::new("", "nvidia-smi: not found\n", 127)),
            Duration::from_millis(8),
        ),
        (
            "gpu-03".to_string(),
            Err(PoolError::UnknownHost("gpu-03".to_string())),
            Duration::ZERO,
        ),
    ];

    let rendered = results_table(&results).to_string();
    assert!(rendered.contains("87 %, 30000 MiB"));
    assert!(rendered.contains("nvidia-smi: not found"));
    assert!(rendered.contains("127"));
    assert!(rendered.contains("Unknown host: gpu-03"));
}
