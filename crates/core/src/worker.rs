// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker identifier and lifecycle state.

use serde::{Deserialize, Serialize};
use std::fmt;

crate::define_id! {
    /// Unique identifier for one worker instance.
    ///
    /// Distinguishes successive generations of the same user's worker
    /// (a reload creates a new instance) in logs and status output.
    pub struct WorkerId;
}

/// Lifecycle state of a worker, driven only by its supervisor.
///
/// `Closed` and `Crashed` are terminal: no transition leaves them, and a
/// new request for the same user must create a new worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    /// Process launched, `Watch` not yet sent.
    Starting,
    /// Continuous rebuild loop active; stays here across build cycles.
    Watching,
    /// `close()` in progress.
    Closing,
    /// Deliberately closed.
    Closed,
    /// Process terminated unexpectedly.
    Crashed,
}

impl WorkerState {
    /// Terminal states never transition again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkerState::Closed | WorkerState::Crashed)
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WorkerState::Starting => "starting",
            WorkerState::Watching => "watching",
            WorkerState::Closing => "closing",
            WorkerState::Closed => "closed",
            WorkerState::Crashed => "crashed",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
#[path = "worker_tests.rs"]
mod tests;
