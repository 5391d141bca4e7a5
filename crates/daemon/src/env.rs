// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the daemon crate.

use std::path::PathBuf;
use std::time::Duration;

use crate::lifecycle::LifecycleError;

/// Resolve state directory: BUILDMUX_STATE_DIR > XDG_STATE_HOME/buildmux >
/// ~/.local/state/buildmux
pub fn state_dir() -> Result<PathBuf, LifecycleError> {
    if let Ok(dir) = std::env::var("BUILDMUX_STATE_DIR") {
        return Ok(PathBuf::from(dir));
    }
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return Ok(PathBuf::from(xdg).join("buildmux"));
    }
    let home = std::env::var("HOME").map_err(|_| LifecycleError::NoStateDir)?;
    Ok(PathBuf::from(home).join(".local/state/buildmux"))
}

/// Idle threshold after which an unused worker is evicted.
/// Unset or `0` disables eviction.
pub fn idle_timeout() -> Result<Option<Duration>, LifecycleError> {
    let Ok(raw) = std::env::var("BUILDMUX_IDLE_SECS") else {
        return Ok(None);
    };
    let secs: u64 = raw
        .parse()
        .map_err(|_| LifecycleError::InvalidIdleSeconds(raw))?;
    Ok((secs > 0).then(|| Duration::from_secs(secs)))
}

/// Path template for per-user build files; `{user}` is substituted.
pub fn config_template() -> String {
    std::env::var("BUILDMUX_CONFIG_TEMPLATE")
        .unwrap_or_else(|_| "/home/{user}/.buildmux/build.toml".to_string())
}

/// Worker binary: BUILDMUX_WORKER_BINARY > `bx-workerd` next to the
/// daemon binary.
pub fn worker_binary() -> Result<PathBuf, LifecycleError> {
    if let Ok(path) = std::env::var("BUILDMUX_WORKER_BINARY") {
        return Ok(PathBuf::from(path));
    }
    let current = std::env::current_exe().map_err(|_| LifecycleError::NoWorkerBinary)?;
    let dir = current.parent().ok_or(LifecycleError::NoWorkerBinary)?;
    Ok(dir.join("bx-workerd"))
}

/// Whether workers run as the OS user they serve (requires privilege).
pub fn isolate_users() -> bool {
    std::env::var("BUILDMUX_ISOLATE")
        .map(|v| v == "1")
        .unwrap_or(false)
}
