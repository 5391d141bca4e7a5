// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker process adapters.
//!
//! A spawned worker is represented as a [`ProcessLink`]: a typed command
//! sender, a typed event receiver, and a kill switch. The supervisor owns
//! the link exclusively; nothing else sends to or kills the process.

mod child;

pub use child::ChildProcessAdapter;

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeProcessAdapter, FakeProcessHandle};

use async_trait::async_trait;
use bx_core::{BuildOptions, SupervisorMsg, WorkerId, WorkerMsg};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, Notify};

/// Errors from spawning a worker process.
#[derive(Debug, Error)]
pub enum SpawnError {
    #[error("failed to launch worker process: {0}")]
    Io(#[from] std::io::Error),

    /// The OS principal named by the user could not be resolved. The
    /// worker must not start with ambiguous privilege.
    #[error("unknown system user: {0}")]
    UnknownPrincipal(String),

    #[error("failed to open log sink {path}: {source}")]
    LogSink {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Everything an adapter needs to launch one worker process.
#[derive(Debug, Clone)]
pub struct SpawnSpec {
    /// Instance id, for log correlation.
    pub worker_id: WorkerId,
    /// The resolved build configuration, forwarded in the `Watch` message.
    pub options: BuildOptions,
}

/// Something the worker process side produced: a protocol message, or the
/// process going away.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessEvent {
    /// A decoded protocol message from the worker.
    Message(WorkerMsg),
    /// The process exited; `code` is its exit status when known. Emitted
    /// exactly once, after which no further events arrive.
    Exited { code: Option<i32> },
}

/// Fire-and-forget process termination.
///
/// `fire()` never blocks and never waits for the process to die; the
/// link's event stream reports the eventual exit. Single consumer: only
/// the adapter's driver listens for the trigger.
#[derive(Clone, Default)]
pub struct KillSwitch {
    inner: Arc<KillInner>,
}

#[derive(Default)]
struct KillInner {
    fired: AtomicBool,
    notify: Notify,
}

impl KillSwitch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request termination. Idempotent.
    pub fn fire(&self) {
        if !self.inner.fired.swap(true, Ordering::SeqCst) {
            self.inner.notify.notify_one();
        }
    }

    /// Whether `fire()` has been called.
    pub fn fired(&self) -> bool {
        self.inner.fired.load(Ordering::SeqCst)
    }

    /// Wait until `fire()` is called. Resolves immediately if it already
    /// was.
    pub async fn triggered(&self) {
        if self.fired() {
            return;
        }
        self.inner.notify.notified().await;
    }
}

/// Live link to one spawned worker process.
pub struct ProcessLink {
    /// Outbound protocol messages. Unbounded so senders never block the
    /// control loop.
    pub commands: mpsc::UnboundedSender<SupervisorMsg>,
    /// Inbound messages and the terminal `Exited` event.
    pub events: mpsc::Receiver<ProcessEvent>,
    /// Kills the underlying process without waiting for it.
    pub kill: KillSwitch,
}

/// Adapter seam between the supervisor and real OS processes.
#[async_trait]
pub trait ProcessAdapter: Clone + Send + Sync + 'static {
    /// Launch a worker process for the given spec.
    async fn spawn(&self, spec: &SpawnSpec) -> Result<ProcessLink, SpawnError>;
}

/// Capacity of the inbound event channel per worker.
const EVENT_CHANNEL_CAPACITY: usize = 64;
