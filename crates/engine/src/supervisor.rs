// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker process supervision.
//!
//! A [`Supervisor`] owns exactly one OS process per [`Worker`] and
//! translates its lifecycle into the IPC protocol: it sends `Watch` once,
//! feeds every `Built`/`NotRunning` into the worker's completion broker,
//! and converts an unsolicited exit into `Crashed` for everyone waiting.
//!
//! `close()` is the only cancellation primitive. It is unconditional and
//! never blocks on process exit: the kill switch is fired, waiters fail
//! with `Terminated`, and the worker is `Closed` immediately — the pump
//! task reaps the actual exit in the background.

use crate::broker::CompletionBroker;
use bx_adapters::{KillSwitch, ProcessAdapter, ProcessEvent, SpawnError, SpawnSpec};
use bx_core::{
    BuildNotification, BuildOptions, IdGen, SupervisorMsg, UserId, UuidIdGen, WaitError,
    WatchOptions, WorkerId, WorkerMsg, WorkerState,
};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Hook invoked on every completed build cycle, after the cycle's outcome
/// is known and before waiters are released.
pub type BuiltHook = Arc<dyn Fn(&BuildNotification) + Send + Sync>;

/// Spawns and supervises worker processes through a [`ProcessAdapter`].
#[derive(Clone)]
pub struct Supervisor<P: ProcessAdapter> {
    adapter: P,
    ids: UuidIdGen,
}

impl<P: ProcessAdapter> Supervisor<P> {
    pub fn new(adapter: P) -> Self {
        Self {
            adapter,
            ids: UuidIdGen,
        }
    }

    /// Launch a worker process for the given build configuration.
    ///
    /// On success the worker is `Starting`; call [`Worker::watch`] to begin
    /// the rebuild loop. On failure nothing is installed anywhere — the
    /// caller decides whether and when to retry.
    pub async fn spawn(&self, options: BuildOptions) -> Result<Arc<Worker>, SpawnError> {
        let worker_id = WorkerId::new(self.ids.next());
        let spec = SpawnSpec {
            worker_id: worker_id.clone(),
            options: options.clone(),
        };

        let link = self.adapter.spawn(&spec).await?;

        tracing::info!(
            user = %options.user,
            worker_id = %worker_id.short(8),
            "spawned worker process"
        );

        let worker = Arc::new(Worker {
            id: worker_id,
            user: options.user.clone(),
            options,
            state: Mutex::new(WorkerState::Starting),
            commands: link.commands,
            kill: link.kill,
            broker: CompletionBroker::new(),
            on_built: Mutex::new(None),
        });

        tokio::spawn(pump(link.events, Arc::clone(&worker)));

        Ok(worker)
    }
}

/// One user's worker: the process handle, its lifecycle state, and the
/// completion broker for its build cycles.
pub struct Worker {
    id: WorkerId,
    user: UserId,
    options: BuildOptions,
    state: Mutex<WorkerState>,
    commands: mpsc::UnboundedSender<SupervisorMsg>,
    kill: KillSwitch,
    broker: CompletionBroker,
    on_built: Mutex<Option<BuiltHook>>,
}

impl Worker {
    pub fn id(&self) -> &WorkerId {
        &self.id
    }

    pub fn user(&self) -> &UserId {
        &self.user
    }

    pub fn state(&self) -> WorkerState {
        *self.state.lock()
    }

    /// Start the continuous rebuild loop.
    ///
    /// Sends `Watch` exactly once (the `Starting → Watching` transition
    /// guards it); later calls just hand back another controller.
    pub fn watch(self: Arc<Self>, watch: WatchOptions, on_built: BuiltHook) -> WatchController {
        let send_start = {
            let mut state = self.state.lock();
            if *state == WorkerState::Starting {
                *state = WorkerState::Watching;
                true
            } else {
                false
            }
        };

        if send_start {
            *self.on_built.lock() = Some(on_built);
            let msg = SupervisorMsg::Watch {
                options: self.options.clone(),
                watch,
            };
            if self.commands.send(msg).is_err() {
                tracing::warn!(
                    user = %self.user,
                    worker_id = %self.id.short(8),
                    "worker link closed before watch could start"
                );
            }
        }

        WatchController { worker: self }
    }

    /// Forcibly terminate the worker. Idempotent, never blocks on the
    /// process actually dying.
    pub fn close(&self) {
        {
            let mut state = self.state.lock();
            if state.is_terminal() {
                return;
            }
            *state = WorkerState::Closing;
        }

        tracing::info!(
            user = %self.user,
            worker_id = %self.id.short(8),
            "closing worker"
        );

        self.kill.fire();
        let released = self.broker.flush(Err(WaitError::Terminated));
        if released > 0 {
            tracing::debug!(user = %self.user, waiters = released, "failed pending waiters on close");
        }

        *self.state.lock() = WorkerState::Closed;
    }

    /// Wait until the current build cycle finishes.
    ///
    /// Registers with the broker first and reconciles after, so a
    /// concurrent flush can never leave this waiter stranded. The
    /// `IsRunning` probe makes an idle worker answer immediately with its
    /// last-known outcome instead of waiting for a cycle that may never
    /// come.
    pub async fn when_done(&self) -> Result<(), WaitError> {
        let rx = self.broker.register();

        match self.state() {
            WorkerState::Crashed => {
                self.broker.flush(Err(WaitError::Crashed));
            }
            WorkerState::Closing | WorkerState::Closed => {
                self.broker.flush(Err(WaitError::Terminated));
            }
            WorkerState::Starting | WorkerState::Watching => {
                // Send may fail if the link just died; the pump's crash
                // handling resolves us in that case.
                let _ = self.commands.send(SupervisorMsg::IsRunning);
            }
        }

        match rx.await {
            Ok(outcome) => outcome,
            Err(_) => Err(WaitError::Terminated),
        }
    }

    /// Number of callers currently waiting on this worker.
    pub fn pending_waiters(&self) -> usize {
        self.broker.pending_count()
    }
}

/// Handle returned by [`Worker::watch`].
#[derive(Clone)]
pub struct WatchController {
    worker: Arc<Worker>,
}

impl WatchController {
    pub fn close(&self) {
        self.worker.close();
    }

    pub async fn when_done(&self) -> Result<(), WaitError> {
        self.worker.when_done().await
    }
}

/// Event pump: translates the process event stream into broker flushes
/// and state transitions. Holds the worker alive until the process is
/// gone.
async fn pump(mut events: mpsc::Receiver<ProcessEvent>, worker: Arc<Worker>) {
    while let Some(event) = events.recv().await {
        match event {
            ProcessEvent::Message(WorkerMsg::Built { error, stats }) => {
                let notification = BuildNotification {
                    error: error.clone(),
                    stats,
                };
                let hook = worker.on_built.lock().clone();
                if let Some(hook) = hook {
                    hook(&notification);
                }

                let outcome = match error {
                    Some(failure) => Err(WaitError::Build(failure)),
                    None => Ok(()),
                };
                let released = worker.broker.flush(outcome);
                tracing::debug!(
                    user = %worker.user,
                    worker_id = %worker.id.short(8),
                    failed = notification.error.is_some(),
                    waiters = released,
                    "build cycle finished"
                );
            }
            ProcessEvent::Message(WorkerMsg::NotRunning { error }) => {
                let outcome = match error {
                    Some(failure) => Err(WaitError::Build(failure)),
                    None => Ok(()),
                };
                worker.broker.flush(outcome);
            }
            ProcessEvent::Exited { code } => {
                if mark_exited(&worker) {
                    tracing::warn!(
                        user = %worker.user,
                        worker_id = %worker.id.short(8),
                        ?code,
                        "worker process exited unexpectedly"
                    );
                    worker.broker.flush(Err(WaitError::Crashed));
                } else {
                    tracing::debug!(
                        user = %worker.user,
                        worker_id = %worker.id.short(8),
                        ?code,
                        "worker process reaped after close"
                    );
                }
                return;
            }
        }
    }

    // Event stream ended without an Exited event: the link was torn down
    // abruptly. Treat it as a crash so waiters never hang.
    if mark_exited(&worker) {
        tracing::warn!(
            user = %worker.user,
            worker_id = %worker.id.short(8),
            "worker link dropped without exit notification"
        );
        worker.broker.flush(Err(WaitError::Crashed));
    }
}

/// Record that the process is gone. Returns true when this counts as a
/// crash (no prior `close()`).
fn mark_exited(worker: &Worker) -> bool {
    let mut state = worker.state.lock();
    match *state {
        WorkerState::Closing | WorkerState::Closed => {
            *state = WorkerState::Closed;
            false
        }
        WorkerState::Crashed => false,
        WorkerState::Starting | WorkerState::Watching => {
            *state = WorkerState::Crashed;
            true
        }
    }
}

#[cfg(test)]
#[path = "supervisor_tests.rs"]
mod tests;
