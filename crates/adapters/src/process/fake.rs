// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake process adapter for testing
#![cfg_attr(coverage_nightly, coverage(off))]

use super::{
    KillSwitch, ProcessAdapter, ProcessEvent, ProcessLink, SpawnError, SpawnSpec,
    EVENT_CHANNEL_CAPACITY,
};
use async_trait::async_trait;
use bx_core::{BuildFailure, BuildStats, SupervisorMsg, WorkerMsg};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Default)]
struct FakeState {
    handles: Vec<FakeProcessHandle>,
    fail_spawns: u32,
}

/// Fake process adapter. Each `spawn` hands the supervisor a live link
/// and records a [`FakeProcessHandle`] through which the test scripts the
/// worker-process side of the protocol.
#[derive(Clone, Default)]
pub struct FakeProcessAdapter {
    inner: Arc<Mutex<FakeState>>,
}

impl FakeProcessAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `spawn` call fail. Stackable.
    pub fn fail_next_spawn(&self) {
        self.inner.lock().fail_spawns += 1;
    }

    /// Number of spawns performed so far.
    pub fn spawn_count(&self) -> usize {
        self.inner.lock().handles.len()
    }

    /// Handle for the `index`-th spawned process.
    pub fn handle(&self, index: usize) -> Option<FakeProcessHandle> {
        self.inner.lock().handles.get(index).cloned()
    }

    /// Handle for the most recently spawned process.
    pub fn last_handle(&self) -> Option<FakeProcessHandle> {
        self.inner.lock().handles.last().cloned()
    }
}

#[async_trait]
impl ProcessAdapter for FakeProcessAdapter {
    async fn spawn(&self, spec: &SpawnSpec) -> Result<ProcessLink, SpawnError> {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (evt_tx, evt_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let kill = KillSwitch::new();

        let handle = FakeProcessHandle {
            spec: spec.clone(),
            received: Arc::new(Mutex::new(Vec::new())),
            commands: Arc::new(Mutex::new(cmd_rx)),
            events: Arc::new(Mutex::new(Some(evt_tx))),
            kill: kill.clone(),
        };

        {
            let mut state = self.inner.lock();
            if state.fail_spawns > 0 {
                state.fail_spawns -= 1;
                return Err(SpawnError::Io(std::io::Error::other(
                    "injected spawn failure",
                )));
            }
            state.handles.push(handle);
        }

        Ok(ProcessLink {
            commands: cmd_tx,
            events: evt_rx,
            kill,
        })
    }
}

/// Test-side endpoint of one fake worker process.
#[derive(Clone)]
pub struct FakeProcessHandle {
    /// The spec this process was spawned with.
    pub spec: SpawnSpec,
    received: Arc<Mutex<Vec<SupervisorMsg>>>,
    commands: Arc<Mutex<mpsc::UnboundedReceiver<SupervisorMsg>>>,
    events: Arc<Mutex<Option<mpsc::Sender<ProcessEvent>>>>,
    kill: KillSwitch,
}

impl FakeProcessHandle {
    async fn send_event(&self, event: ProcessEvent) {
        let sender = self.events.lock().clone();
        if let Some(sender) = sender {
            let _ = sender.send(event).await;
        }
    }

    fn drain(&self) {
        let mut rx = self.commands.lock();
        let mut received = self.received.lock();
        while let Ok(msg) = rx.try_recv() {
            received.push(msg);
        }
    }

    /// All supervisor commands received so far, in order.
    pub fn received_commands(&self) -> Vec<SupervisorMsg> {
        self.drain();
        self.received.lock().clone()
    }

    /// How many `Watch` commands arrived (idempotence checks).
    pub fn watch_count(&self) -> usize {
        self.received_commands()
            .iter()
            .filter(|msg| matches!(msg, SupervisorMsg::Watch { .. }))
            .count()
    }

    /// Emit a `Built` notification, as if a build cycle just finished.
    pub async fn emit_built(&self, error: Option<BuildFailure>) {
        let msg = WorkerMsg::Built {
            error,
            stats: BuildStats { end_time_ms: 0 },
        };
        self.send_event(ProcessEvent::Message(msg)).await;
    }

    /// Emit a `NotRunning` reply carrying the last cycle's error.
    pub async fn emit_not_running(&self, error: Option<BuildFailure>) {
        self.send_event(ProcessEvent::Message(WorkerMsg::NotRunning { error }))
            .await;
    }

    /// Simulate process exit (crash when the supervisor didn't ask for it).
    pub async fn exit(&self, code: Option<i32>) {
        self.send_event(ProcessEvent::Exited { code }).await;
    }

    /// Tear the event stream down without an `Exited` event, as if the
    /// link died mid-flight.
    pub fn disconnect(&self) {
        self.events.lock().take();
    }

    /// Whether the supervisor fired the kill switch.
    pub fn killed(&self) -> bool {
        self.kill.fired()
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
