// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker-process side of the IPC protocol (`bx-workerd`).
//!
//! Reads `SupervisorMsg` frames from stdin, writes `WorkerMsg` frames to
//! stdout. On `Watch` it loads the user's build file, runs one cycle
//! immediately, then reruns a cycle per debounced burst of filesystem
//! changes. Build tool output goes to stderr, which the supervisor wired
//! to the log sink (or left inherited) at spawn.

use bx_adapters::wire::{self, FrameError};
use bx_core::{BuildFailure, BuildOptions, BuildStats, SupervisorMsg, WatchOptions, WorkerMsg};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use serde::Deserialize;
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tokio::io::{AsyncRead, BufReader};
use tokio::sync::mpsc;

/// Errors that end the runner's message loop.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),
}

/// Errors from loading the user's build file.
#[derive(Debug, Error)]
pub enum BuildFileError {
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid build file {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// The user's build file (TOML).
///
/// ```toml
/// command = "npm run build"
/// watch = ["src", "assets"]
///
/// [env]
/// NODE_ENV = "development"
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BuildFile {
    /// Shell command run once per build cycle.
    pub command: String,
    /// Paths to watch for changes, relative to the build file's
    /// directory. Defaults to the directory itself.
    #[serde(default)]
    pub watch: Vec<PathBuf>,
    /// Environment for the build command.
    #[serde(default)]
    pub env: HashMap<String, String>,
}

impl BuildFile {
    pub fn load(path: &Path) -> Result<Self, BuildFileError> {
        let text = std::fs::read_to_string(path).map_err(|e| BuildFileError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        toml::from_str(&text).map_err(|e| BuildFileError::Parse {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Watch paths resolved against the build file's directory.
    pub fn watch_paths(&self, base_dir: &Path) -> Vec<PathBuf> {
        if self.watch.is_empty() {
            return vec![base_dir.to_path_buf()];
        }
        self.watch
            .iter()
            .map(|path| {
                if path.is_absolute() {
                    path.clone()
                } else {
                    base_dir.join(path)
                }
            })
            .collect()
    }
}

/// Entry point for the `bx-workerd` binary: serve the protocol over
/// stdin/stdout until the supervisor goes away.
pub async fn run() -> Result<(), RunnerError> {
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<WorkerMsg>();

    // Writer: serialize outbound messages onto stdout.
    tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(msg) = out_rx.recv().await {
            let frame = match wire::encode(&msg) {
                Ok(frame) => frame,
                Err(e) => {
                    tracing::warn!(error = %e, "failed to encode message");
                    continue;
                }
            };
            if let Err(e) = wire::write_frame(&mut stdout, &frame).await {
                tracing::warn!(error = %e, "failed to write to supervisor");
                break;
            }
        }
    });

    serve(tokio::io::stdin(), out_tx).await
}

/// Message loop over any input stream. Split from [`run`] so tests can
/// drive the protocol without a real process.
pub async fn serve<I: AsyncRead + Unpin>(
    input: I,
    out: mpsc::UnboundedSender<WorkerMsg>,
) -> Result<(), RunnerError> {
    let mut reader = BufReader::new(input);
    let running = Arc::new(AtomicBool::new(false));
    let last_error: Arc<Mutex<Option<BuildFailure>>> = Arc::new(Mutex::new(None));
    let mut watching = false;

    loop {
        let frame = match wire::read_frame(&mut reader).await {
            Ok(frame) => frame,
            Err(FrameError::ConnectionClosed) => {
                // Supervisor went away; nothing left to serve.
                return Ok(());
            }
            Err(e) => return Err(RunnerError::Frame(e)),
        };

        let msg = match wire::decode::<SupervisorMsg>(&frame) {
            Ok(msg) => msg,
            Err(e) => {
                tracing::warn!(error = %e, "ignoring malformed supervisor message");
                continue;
            }
        };

        match msg {
            SupervisorMsg::Watch { options, watch } => {
                if watching {
                    // At most one watch loop per process lifetime.
                    continue;
                }
                watching = true;
                tracing::info!(user = %options.user, "starting watch loop");
                tokio::spawn(watch_loop(
                    options,
                    watch,
                    out.clone(),
                    Arc::clone(&running),
                    Arc::clone(&last_error),
                ));
            }

            SupervisorMsg::IsRunning => {
                // Only answer when idle; mid-build, the supervisor learns
                // the outcome from the upcoming Built message.
                if !running.load(Ordering::SeqCst) {
                    let _ = out.send(WorkerMsg::NotRunning {
                        error: last_error.lock().clone(),
                    });
                }
            }
        }
    }
}

/// Continuous rebuild loop: initial cycle, then one cycle per debounced
/// burst of filesystem changes.
async fn watch_loop(
    options: BuildOptions,
    watch: WatchOptions,
    out: mpsc::UnboundedSender<WorkerMsg>,
    running: Arc<AtomicBool>,
    last_error: Arc<Mutex<Option<BuildFailure>>>,
) {
    let base_dir = options
        .config_path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .to_path_buf();

    let build = match BuildFile::load(&options.config_path) {
        Ok(build) => build,
        Err(e) => {
            report_cycle(&out, &last_error, Some(BuildFailure::new(e.to_string())));
            return;
        }
    };

    let (change_tx, mut change_rx) = mpsc::channel::<()>(16);
    let _watcher = match create_change_watcher(&build.watch_paths(&base_dir), change_tx) {
        Ok(watcher) => watcher,
        Err(e) => {
            report_cycle(
                &out,
                &last_error,
                Some(BuildFailure::new(format!("failed to watch sources: {e}"))),
            );
            return;
        }
    };

    let debounce = Duration::from_millis(watch.debounce_ms);
    run_cycle(&build, &options, &out, &running, &last_error).await;

    loop {
        if change_rx.recv().await.is_none() {
            return;
        }
        drain_burst(&mut change_rx, debounce).await;
        run_cycle(&build, &options, &out, &running, &last_error).await;
    }
}

fn create_change_watcher(
    paths: &[PathBuf],
    tx: mpsc::Sender<()>,
) -> Result<RecommendedWatcher, notify::Error> {
    let mut watcher = notify::recommended_watcher(move |res: Result<notify::Event, _>| {
        if res.is_ok() {
            let _ = tx.blocking_send(());
        }
    })?;

    for path in paths {
        watcher.watch(path, RecursiveMode::Recursive)?;
    }
    Ok(watcher)
}

/// Swallow change events until `quiet` elapses with none, so a burst of
/// saves triggers a single cycle.
async fn drain_burst(rx: &mut mpsc::Receiver<()>, quiet: Duration) {
    loop {
        match tokio::time::timeout(quiet, rx.recv()).await {
            Ok(Some(())) => continue,
            Ok(None) => return,
            Err(_) => return,
        }
    }
}

/// Run the build command once and report the cycle.
async fn run_cycle(
    build: &BuildFile,
    options: &BuildOptions,
    out: &mpsc::UnboundedSender<WorkerMsg>,
    running: &AtomicBool,
    last_error: &Mutex<Option<BuildFailure>>,
) {
    running.store(true, Ordering::SeqCst);
    tracing::info!(command = %build.command, "starting build cycle");

    let mut cmd = tokio::process::Command::new("sh");
    cmd.arg("-c")
        .arg(&build.command)
        .current_dir(
            options
                .config_path
                .parent()
                .unwrap_or_else(|| Path::new(".")),
        )
        .stdin(std::process::Stdio::null());
    for (key, value) in &build.env {
        cmd.env(key, value);
    }
    for (key, value) in &options.env {
        cmd.env(key, value);
    }

    let error = match cmd.output().await {
        Ok(output) => {
            forward_output(&output.stdout, &output.stderr);
            if output.status.success() {
                None
            } else {
                Some(BuildFailure {
                    message: failure_detail(&output.stdout, &output.stderr),
                    exit_code: output.status.code(),
                })
            }
        }
        Err(e) => Some(BuildFailure::new(format!(
            "failed to run build command: {e}"
        ))),
    };

    match &error {
        None => match &options.success_message {
            Some(message) => tracing::info!("{message}"),
            None => tracing::info!("build succeeded"),
        },
        Some(failure) => tracing::error!(error = %failure, "build failed"),
    }

    running.store(false, Ordering::SeqCst);
    report_cycle(out, last_error, error);
}

fn report_cycle(
    out: &mpsc::UnboundedSender<WorkerMsg>,
    last_error: &Mutex<Option<BuildFailure>>,
    error: Option<BuildFailure>,
) {
    *last_error.lock() = error.clone();
    let _ = out.send(WorkerMsg::Built {
        error,
        stats: BuildStats {
            end_time_ms: epoch_ms(),
        },
    });
}

/// Mirror the build tool's output onto stderr (the log sink).
fn forward_output(stdout: &[u8], stderr: &[u8]) {
    let mut sink = std::io::stderr().lock();
    let _ = sink.write_all(stdout);
    let _ = sink.write_all(stderr);
}

/// Trailing output of a failed cycle, for the failure payload.
fn failure_detail(stdout: &[u8], stderr: &[u8]) -> String {
    let text = if stderr.is_empty() { stdout } else { stderr };
    let text = String::from_utf8_lossy(text);
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return "build command failed".to_string();
    }

    let lines: Vec<&str> = trimmed.lines().collect();
    let tail = lines.len().saturating_sub(10);
    lines[tail..].join("\n")
}

fn epoch_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
#[path = "runner_tests.rs"]
mod tests;
