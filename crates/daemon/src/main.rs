// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Buildmux Daemon (bxd)
//!
//! Background process serving per-user build workers over a Unix socket.

use std::sync::Arc;

use bx_daemon::lifecycle::{self, Config, LifecycleError, StartupResult};
use bx_daemon::listener::Listener;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::Notify;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Handle info flags before any config/lock acquisition
    if let Some(arg) = std::env::args().nth(1) {
        match arg.as_str() {
            "--version" | "-V" | "-v" => {
                println!("bxd {}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            "--help" | "-h" | "help" => {
                println!("bxd {}", env!("CARGO_PKG_VERSION"));
                println!(
                    "Buildmux Daemon - serves per-user build workers over a Unix socket"
                );
                println!();
                println!("USAGE:");
                println!("    bxd");
                println!();
                println!("The daemon listens on a Unix socket under the state directory");
                println!("(BUILDMUX_STATE_DIR, default ~/.local/state/buildmux) and is");
                println!("configured entirely through the environment:");
                println!();
                println!("    BUILDMUX_CONFIG_TEMPLATE  per-user build file path, {{user}} substituted");
                println!("    BUILDMUX_IDLE_SECS        evict workers idle past this many seconds");
                println!("    BUILDMUX_ISOLATE          run workers as the user they serve (=1)");
                println!("    BUILDMUX_WORKER_BINARY    override the bx-workerd path");
                println!();
                println!("OPTIONS:");
                println!("    -h, --help       Print help information");
                println!("    -v, --version    Print version information");
                return Ok(());
            }
            _ => {
                eprintln!("error: unexpected argument '{arg}'");
                eprintln!("Usage: bxd [--help | --version]");
                std::process::exit(1);
            }
        }
    }

    // Load configuration
    let config = Config::load()?;

    // Write startup marker to log (before tracing setup, so operators can
    // find where the current startup attempt begins)
    write_startup_marker(&config)?;

    // Set up logging
    let _log_guard = setup_logging(&config)?;

    info!("Starting buildmux daemon");

    let StartupResult {
        orchestrator,
        listener: unix_listener,
        lock_file: _lock_file,
    } = match lifecycle::startup(&config).await {
        Ok(result) => result,
        Err(LifecycleError::LockFailed(_)) => {
            // Another daemon is already running — print a human-readable
            // message instead of a raw debug error.
            let pid = std::fs::read_to_string(&config.lock_path)
                .unwrap_or_default()
                .trim()
                .to_string();

            eprintln!("bxd is already running");
            if !pid.is_empty() {
                eprintln!("  pid: {pid}");
            }
            std::process::exit(1);
        }
        Err(e) => {
            error!("Failed to start daemon: {}", e);
            return Err(e.into());
        }
    };

    // Shutdown signal from the listener (Request::Shutdown)
    let shutdown_notify = Arc::new(Notify::new());

    // Spawn listener task
    let listener = Listener::new(
        unix_listener,
        Arc::clone(&orchestrator),
        Arc::clone(&shutdown_notify),
    );
    tokio::spawn(listener.run());

    // Spawn the idle-eviction sweeper (no-op when eviction is disabled)
    let sweeper = orchestrator.registry().spawn_sweeper();

    // Set up signal handlers
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    info!(
        "Daemon ready, listening on {}",
        config.socket_path.display()
    );

    // Signal ready for parent process (e.g. systemd, a CLI waiting for startup)
    println!("READY");

    tokio::select! {
        _ = shutdown_notify.notified() => {
            info!("Shutdown requested via command");
        }
        _ = sigterm.recv() => {
            info!("Received SIGTERM, shutting down...");
        }
        _ = sigint.recv() => {
            info!("Received SIGINT, shutting down...");
        }
    }

    // Graceful shutdown: stop sweeping, close every worker
    if let Some(sweeper) = sweeper {
        sweeper.abort();
    }
    orchestrator.shutdown();
    info!("Daemon stopped");
    Ok(())
}

/// Startup marker prefix written to log before anything else.
/// Full format: "--- bxd: starting (pid: 12345) ---"
pub const STARTUP_MARKER_PREFIX: &str = "--- bxd: starting (pid: ";

/// Write startup marker to log file (appends to existing log)
fn write_startup_marker(config: &Config) -> Result<(), LifecycleError> {
    use std::io::Write;

    if let Some(parent) = config.log_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&config.log_path)?;
    writeln!(file, "{}{})", STARTUP_MARKER_PREFIX, std::process::id())?;

    Ok(())
}

fn setup_logging(
    config: &Config,
) -> Result<tracing_appender::non_blocking::WorkerGuard, LifecycleError> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    if let Some(parent) = config.log_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let file_appender = tracing_appender::rolling::never(
        config.log_path.parent().ok_or(LifecycleError::NoStateDir)?,
        config
            .log_path
            .file_name()
            .ok_or(LifecycleError::NoStateDir)?,
    );
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(non_blocking))
        .init();

    Ok(guard)
}
