//! Logging setup for the dashboard
//!
//! Console output goes to stderr so command output on stdout stays clean.
//! An optional JSON file layer rotates daily. `RUST_LOG` overrides the
//! configured level.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

const FLEETDECK_TARGETS: &[&str] = &[
    "fleetdeck",
    "fleetdeck_core",
    "fleetdeck_pool",
    "fleetdeck_ssh",
];

/// `[logging]` section of the configuration file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// Level for fleetdeck crates; everything else logs at `warn`
    pub level: String,
    /// Write JSON logs to a daily rotating file
    pub json: bool,
    /// Directory for JSON log files
    pub directory: Option<PathBuf>,
    /// Include file and line in console output
    pub include_location: bool,
    /// Log span open/close events
    pub spans: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            directory: None,
            include_location: false,
            spans: false,
        }
    }
}

impl LogSettings {
    pub fn log_dir(&self) -> PathBuf {
        self.directory.clone().unwrap_or_else(log_directory)
    }

    /// Filter directive used when `RUST_LOG` is unset; each `-v` raises the level
    pub fn default_filter(&self, verbosity: u8) -> String {
        let level = match verbosity {
            0 => self.level.as_str(),
            1 => "debug",
            _ => "trace",
        };
        let mut filter = String::from("warn");
        for target in FLEETDECK_TARGETS {
            filter.push_str(&format!(",{target}={level}"));
        }
        filter
    }
}

/// Default directory for log files
pub fn log_directory() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("fleetdeck")
        .join("logs")
}

/// Install the global subscriber
///
/// The returned guard flushes the file writer on drop and must be held until
/// the program exits.
pub fn init(settings: &LogSettings, verbosity: u8) -> anyhow::Result<Option<WorkerGuard>> {
    let default_filter = settings.default_filter(verbosity);
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&default_filter));

    let span_events = if settings.spans {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let mut layers = Vec::new();

    let console_layer = fmt::layer()
        .with_target(true)
        .with_file(settings.include_location)
        .with_line_number(settings.include_location)
        .with_span_events(span_events.clone())
        .with_writer(std::io::stderr)
        .compact()
        .with_filter(env_filter.clone())
        .boxed();
    layers.push(console_layer);

    let mut guard = None;
    if settings.json {
        let log_dir = settings.log_dir();
        std::fs::create_dir_all(&log_dir)?;

        let file_appender = tracing_appender::rolling::daily(&log_dir, "fleetdeck.log");
        let (non_blocking, worker_guard) = tracing_appender::non_blocking(file_appender);
        guard = Some(worker_guard);

        let json_layer = fmt::layer()
            .with_target(true)
            .with_thread_names(true)
            .with_file(true)
            .with_line_number(true)
            .with_span_events(span_events)
            .with_ansi(false)
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_writer(non_blocking)
            .with_filter(env_filter)
            .boxed();
        layers.push(json_layer);
    }

    tracing_subscriber::registry()
        .with(layers)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {e}"))?;

    tracing::debug!(
        filter = %default_filter,
        json = settings.json,
        log_dir = %settings.log_dir().display(),
        "logging initialized"
    );

    Ok(guard)
}
