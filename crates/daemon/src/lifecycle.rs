// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon lifecycle management: configuration, single-instance lock,
//! startup.

use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use bx_adapters::ChildProcessAdapter;
use bx_core::{SystemClock, WatchOptions};
use bx_engine::{PathTemplateResolver, Registry, Supervisor};
use fs2::FileExt;
use thiserror::Error;
use tokio::net::UnixListener;

use crate::env;
use crate::orchestrator::Orchestrator;

/// Orchestrator with the daemon's concrete adapter types.
pub type DaemonOrchestrator =
    Orchestrator<ChildProcessAdapter, PathTemplateResolver, SystemClock>;

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Root state directory (e.g. ~/.local/state/buildmux)
    pub state_dir: PathBuf,
    /// Path to Unix socket
    pub socket_path: PathBuf,
    /// Path to lock/PID file
    pub lock_path: PathBuf,
    /// Path to daemon log file
    pub log_path: PathBuf,
    /// Path to per-worker log sinks
    pub logs_path: PathBuf,
    /// Path template for per-user build files (`{user}` substituted)
    pub config_template: String,
    /// Idle threshold for worker eviction; `None` disables it
    pub idle: Option<Duration>,
    /// Worker binary launched per user
    pub worker_binary: PathBuf,
    /// Run workers as the OS user they serve
    pub isolate_users: bool,
}

impl Config {
    /// Load configuration from the environment.
    ///
    /// One daemon serves all users of the machine; state lives under a
    /// single fixed directory.
    pub fn load() -> Result<Self, LifecycleError> {
        let state_dir = env::state_dir()?;

        Ok(Self {
            socket_path: state_dir.join("daemon.sock"),
            lock_path: state_dir.join("daemon.pid"),
            log_path: state_dir.join("daemon.log"),
            logs_path: state_dir.join("logs"),
            config_template: env::config_template(),
            idle: env::idle_timeout()?,
            worker_binary: env::worker_binary()?,
            isolate_users: env::isolate_users(),
            state_dir,
        })
    }
}

/// Errors during daemon startup.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("cannot determine state directory (set BUILDMUX_STATE_DIR or HOME)")]
    NoStateDir,

    #[error("invalid BUILDMUX_IDLE_SECS value: {0}")]
    InvalidIdleSeconds(String),

    #[error("cannot locate worker binary (set BUILDMUX_WORKER_BINARY)")]
    NoWorkerBinary,

    #[error("Failed to acquire daemon lock")]
    LockFailed(#[source] std::io::Error),

    #[error("Failed to bind socket at {0}: {1}")]
    BindFailed(PathBuf, std::io::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result of daemon startup.
pub struct StartupResult {
    /// The orchestrator, shared with the listener task
    pub orchestrator: Arc<DaemonOrchestrator>,
    /// The Unix socket listener to hand to a Listener task
    pub listener: UnixListener,
    // NOTE(lifetime): Held to maintain exclusive file lock; released on drop
    #[allow(dead_code)]
    pub lock_file: File,
}

/// Start the daemon: acquire the lock, build the orchestrator, bind the
/// socket.
pub async fn startup(config: &Config) -> Result<StartupResult, LifecycleError> {
    // 1. Create state directories (needed for socket, lock, log sinks)
    std::fs::create_dir_all(&config.state_dir)?;
    std::fs::create_dir_all(&config.logs_path)?;

    // 2. Acquire lock file FIRST - prevents races
    // Use OpenOptions to avoid truncating the file before we hold the lock,
    // which would wipe the running daemon's PID.
    let lock_file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(&config.lock_path)?;
    lock_file
        .try_lock_exclusive()
        .map_err(LifecycleError::LockFailed)?;

    // Write PID to lock file (truncate now that we hold the lock)
    use std::io::Write;
    let mut lock_file = lock_file;
    lock_file.set_len(0)?;
    writeln!(lock_file, "{}", std::process::id())?;
    let lock_file = lock_file; // Drop mutability

    // 3. Build the orchestrator: registry + supervisor + resolver
    let registry = Registry::new(config.idle);
    let adapter =
        ChildProcessAdapter::new(&config.worker_binary).with_isolation(config.isolate_users);
    let resolver = PathTemplateResolver::new(config.config_template.clone())
        .with_logs_dir(&config.logs_path);
    let orchestrator = Arc::new(Orchestrator::new(
        registry,
        Supervisor::new(adapter),
        resolver,
        WatchOptions::default(),
    ));

    // 4. Remove stale socket and bind (LAST - only after all validation passes)
    if config.socket_path.exists() {
        std::fs::remove_file(&config.socket_path)?;
    }
    let listener = UnixListener::bind(&config.socket_path)
        .map_err(|e| LifecycleError::BindFailed(config.socket_path.clone(), e))?;

    Ok(StartupResult {
        orchestrator,
        listener,
        lock_file,
    })
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
