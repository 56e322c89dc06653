//! Fleetdeck - command-line dashboard for a GPU fleet
//!
//! Loads the host inventory, registers every host with one pooled
//! connection manager and runs the requested subcommand through it.

mod commands;
mod config;
mod events;
mod logging;
mod output;

use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{ArgAction, Parser, Subcommand};
use fleetdeck_pool::ConnectionPoolManager;

use crate::commands::WatchOptions;
use crate::config::{AppConfig, CONFIG_ENV};

#[derive(Debug, Parser)]
#[command(name = "fleetdeck", version, about = "Run commands across a GPU fleet over pooled SSH sessions")]
struct Cli {
    /// Configuration file (default: <config dir>/fleetdeck/fleetdeck.toml)
    #[arg(short, long, env = CONFIG_ENV, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Connect to every host and show pool status
    Status {
        #[arg(long)]
        json: bool,
    },
    /// Show per-host pool statistics without connecting
    Stats {
        #[arg(long)]
        json: bool,
    },
    /// Run a command on one host
    Run {
        /// Host id from the configuration file
        host: String,
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },
    /// Run a command on every host concurrently
    Broadcast {
        /// Print one JSON object per host
        #[arg(long)]
        json: bool,
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },
    /// Poll every host on an interval until interrupted
    Watch {
        /// Seconds between rounds
        #[arg(short, long, default_value_t = 5)]
        interval: u64,
        /// Stop after this many rounds
        #[arg(short = 'n', long)]
        count: Option<u64>,
        #[arg(long)]
        json: bool,
        /// Command to run each round
        #[arg(
            long,
            default_value = "nvidia-smi --query-gpu=index,utilization.gpu,memory.used,memory.total --format=csv,noheader"
        )]
        command: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<u8> {
    let path = config::resolve_path(cli.config.as_deref())?;
    let config = AppConfig::load(&path)?;
    let _log_guard = logging::init(&config.logging, cli.verbose)?;

    let transport = Arc::new(config.ssh.transport());
    let manager = ConnectionPoolManager::new(config.pool.clone(), transport);
    for host in config.hosts {
        let id = host.id.clone();
        manager
            .register_host(host)
            .with_context(|| format!("failed to register host '{id}'"))?;
    }
    tracing::info!(hosts = manager.host_ids().len(), config = %path.display(), "fleet loaded");

    let event_logger = events::spawn_event_logger(manager.subscribe());
    let result = dispatch(&manager, cli.command).await;

    manager.shutdown().await;
    event_logger.abort();
    result
}

async fn dispatch(manager: &ConnectionPoolManager, command: Command) -> anyhow::Result<u8> {
    let mut stdout = io::stdout().lock();
    match command {
        Command::Status { json } => commands::status(manager, json, &mut stdout).await,
        Command::Stats { json } => commands::stats(manager, json, &mut stdout),
        Command::Run { host, command } => {
            let mut stderr = io::stderr().lock();
            commands::run(manager, &host, &command.join(" "), &mut stdout, &mut stderr).await
        }
        Command::Broadcast { json, command } => {
            commands::broadcast(manager, &command.join(" "), json, &mut stdout).await
        }
        Command::Watch {
            interval,
            count,
            json,
            command,
        } => {
            let options = WatchOptions {
                command,
                interval: Duration::from_secs(interval.max(1)),
                rounds: count,
                json,
            };
            commands::watch(manager, &options, &mut stdout).await
        }
    }
}
