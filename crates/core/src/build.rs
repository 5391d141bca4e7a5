// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Build configuration and build-cycle outcome types.
//!
//! `BuildOptions` is resolved per user on every (re)load and handed to the
//! worker process verbatim inside the `Watch` message. The outcome types
//! travel the other way: `BuildStats`/`BuildFailure` ride in `Built`
//! notifications, and `WaitError` is what a `when_done` caller observes.

use crate::user::UserId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;

/// Per-user build configuration, resolved fresh on every (re)load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildOptions {
    /// The user this build belongs to.
    pub user: UserId,
    /// Path to the user's build file (TOML: command, watch paths, env).
    pub config_path: PathBuf,
    /// Extra environment for the build command, merged over the build
    /// file's own `[env]` table.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub env: HashMap<String, String>,
    /// Append-only destination for the worker's output. `None` inherits
    /// the daemon's stderr.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_path: Option<PathBuf>,
    /// Line logged after each successful cycle.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success_message: Option<String>,
}

impl BuildOptions {
    /// Minimal options: just a user and their build file.
    pub fn new(user: UserId, config_path: impl Into<PathBuf>) -> Self {
        Self {
            user,
            config_path: config_path.into(),
            env: HashMap::new(),
            log_path: None,
            success_message: None,
        }
    }
}

/// Options controlling the watch loop inside the worker process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchOptions {
    /// Quiet period after a filesystem event before a cycle starts, so a
    /// burst of saves triggers one rebuild.
    pub debounce_ms: u64,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self { debounce_ms: 300 }
    }
}

/// Timing data for one completed build cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildStats {
    /// Cycle end time, Unix epoch milliseconds.
    pub end_time_ms: u64,
}

/// A failed build cycle, as reported by the worker process.
///
/// Not fatal to the worker: it stays watching and the next cycle may
/// succeed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("build failed{}: {}", fmt_exit_code(.exit_code), .message)]
pub struct BuildFailure {
    /// Human-readable failure detail (trailing tool output or spawn error).
    pub message: String,
    /// Exit code of the build command, when it ran at all.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
}

fn fmt_exit_code(code: &Option<i32>) -> String {
    match code {
        Some(c) => format!(" (exit code {c})"),
        None => String::new(),
    }
}

impl BuildFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            exit_code: None,
        }
    }

    pub fn with_exit_code(message: impl Into<String>, code: i32) -> Self {
        Self {
            message: message.into(),
            exit_code: Some(code),
        }
    }
}

/// One build cycle's outcome as delivered to `on_built` hooks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildNotification {
    /// Failure detail for failed cycles, `None` on success.
    pub error: Option<BuildFailure>,
    /// Timing data for the cycle.
    pub stats: BuildStats,
}

/// Why a `when_done` wait resolved unsuccessfully.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WaitError {
    /// The current cycle completed with a failure. The worker keeps
    /// watching; a later wait may succeed.
    #[error(transparent)]
    Build(BuildFailure),
    /// The worker process terminated unexpectedly. Fatal to this worker;
    /// the user needs a fresh one.
    #[error("worker process crashed")]
    Crashed,
    /// The worker was closed deliberately (reload, eviction, shutdown).
    #[error("worker terminated")]
    Terminated,
}

#[cfg(test)]
#[path = "build_tests.rs"]
mod tests;
