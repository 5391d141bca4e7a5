// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Real process adapter: spawns `bx-workerd` and pumps framed messages
//! over its stdin/stdout.
//!
//! Stream layout per worker: stdin carries supervisor → worker frames,
//! stdout carries worker → supervisor frames, stderr is the log sink
//! (redirected to the configured file, or inherited from the daemon).

use super::{
    KillSwitch, ProcessAdapter, ProcessEvent, ProcessLink, SpawnError, SpawnSpec,
    EVENT_CHANNEL_CAPACITY,
};
use crate::wire;
use async_trait::async_trait;
use bx_core::{SupervisorMsg, WorkerMsg};
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::BufReader;
use tokio::process::Command;
use tokio::sync::mpsc;

/// Spawns worker processes from the `bx-workerd` binary.
#[derive(Debug, Clone)]
pub struct ChildProcessAdapter {
    program: PathBuf,
    isolate: bool,
}

impl ChildProcessAdapter {
    /// Adapter launching the given worker binary.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            isolate: false,
        }
    }

    /// Run each worker as the OS user named by its `UserId`. The daemon
    /// must hold the privilege to switch uids; user lookup failures
    /// become `SpawnError::UnknownPrincipal` at spawn time.
    pub fn with_isolation(mut self, isolate: bool) -> Self {
        self.isolate = isolate;
        self
    }
}

#[async_trait]
impl ProcessAdapter for ChildProcessAdapter {
    async fn spawn(&self, spec: &SpawnSpec) -> Result<ProcessLink, SpawnError> {
        let mut cmd = Command::new(&self.program);
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .kill_on_drop(true);

        match &spec.options.log_path {
            Some(path) => {
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent).map_err(|e| SpawnError::LogSink {
                        path: path.clone(),
                        source: e,
                    })?;
                }
                let sink = std::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .map_err(|e| SpawnError::LogSink {
                        path: path.clone(),
                        source: e,
                    })?;
                cmd.stderr(Stdio::from(sink));
            }
            None => {
                cmd.stderr(Stdio::inherit());
            }
        }

        if self.isolate {
            let name = spec.options.user.as_str();
            let principal = nix::unistd::User::from_name(name)
                .map_err(|e| SpawnError::UnknownPrincipal(format!("{name}: {e}")))?
                .ok_or_else(|| SpawnError::UnknownPrincipal(name.to_string()))?;
            cmd.uid(principal.uid.as_raw());
            cmd.gid(principal.gid.as_raw());
        }

        let mut child = cmd.spawn()?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| SpawnError::Io(std::io::Error::other("worker stdin unavailable")))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SpawnError::Io(std::io::Error::other("worker stdout unavailable")))?;

        let (cmd_tx, mut cmd_rx) = mpsc::unbounded_channel::<SupervisorMsg>();
        let (evt_tx, evt_rx) = mpsc::channel::<ProcessEvent>(EVENT_CHANNEL_CAPACITY);
        let kill = KillSwitch::new();

        let worker_id = spec.worker_id.clone();

        // Writer: serialize outbound commands onto the child's stdin.
        let writer_id = worker_id.clone();
        tokio::spawn(async move {
            let mut stdin = stdin;
            while let Some(msg) = cmd_rx.recv().await {
                let frame = match wire::encode(&msg) {
                    Ok(frame) => frame,
                    Err(e) => {
                        tracing::warn!(worker_id = %writer_id, error = %e, "failed to encode command");
                        continue;
                    }
                };
                if let Err(e) = wire::write_frame(&mut stdin, &frame).await {
                    tracing::warn!(worker_id = %writer_id, error = %e, "failed to write to worker");
                    break;
                }
            }
        });

        // Driver: decode inbound frames, watch for kill, reap the child.
        let driver_kill = kill.clone();
        tokio::spawn(async move {
            let mut reader = BufReader::new(stdout);
            loop {
                tokio::select! {
                    frame = wire::read_frame(&mut reader) => match frame {
                        Ok(bytes) => match wire::decode::<WorkerMsg>(&bytes) {
                            Ok(msg) => {
                                if evt_tx.send(ProcessEvent::Message(msg)).await.is_err() {
                                    break;
                                }
                            }
                            Err(e) => {
                                // Malformed messages are logged and skipped,
                                // never fatal to the control loop.
                                tracing::warn!(worker_id = %worker_id, error = %e, "ignoring malformed worker message");
                            }
                        },
                        Err(wire::FrameError::ConnectionClosed) => break,
                        Err(e) => {
                            tracing::warn!(worker_id = %worker_id, error = %e, "worker stream error");
                            break;
                        }
                    },
                    _ = driver_kill.triggered() => {
                        if let Err(e) = child.start_kill() {
                            tracing::debug!(worker_id = %worker_id, error = %e, "kill failed (process already gone)");
                        }
                        break;
                    }
                }
            }

            let code = match child.wait().await {
                Ok(status) => status.code(),
                Err(e) => {
                    tracing::warn!(worker_id = %worker_id, error = %e, "failed to reap worker process");
                    None
                }
            };
            let _ = evt_tx.send(ProcessEvent::Exited { code }).await;
        });

        Ok(ProcessLink {
            commands: cmd_tx,
            events: evt_rx,
            kill,
        })
    }
}

#[cfg(test)]
#[path = "child_tests.rs"]
mod tests;
