// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! IPC message vocabulary between a supervisor and its worker process.
//!
//! Serializes with `{"event": "...", ...fields}` format; frames are
//! length-prefixed JSON (see `bx-adapters::wire`). Delivery is
//! asynchronous; each endpoint processes messages in arrival order.

use crate::build::{BuildFailure, BuildOptions, BuildStats, WatchOptions};
use serde::{Deserialize, Serialize};

/// Supervisor → worker process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SupervisorMsg {
    /// Begin continuous rebuilding on source changes. Sent at most once
    /// per process lifetime; a worker that is already watching ignores it.
    Watch {
        options: BuildOptions,
        #[serde(default)]
        watch: WatchOptions,
    },

    /// "Are you mid-build right now?" The worker replies `NotRunning`
    /// only when idle; otherwise the answer arrives as the next `Built`.
    IsRunning,
}

/// Worker process → supervisor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum WorkerMsg {
    /// One build cycle completed. Failed cycles populate `error`.
    Built {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<BuildFailure>,
        stats: BuildStats,
    },

    /// Reply to `IsRunning` when no cycle is in flight. Carries the error
    /// from the most recently completed cycle so a late-joining waiter
    /// reconciles against last-known state instead of hanging.
    NotRunning {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<BuildFailure>,
    },
}

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;
