// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Build-configuration resolution.
//!
//! The resolver is re-invoked on every (re)load and must reflect the
//! current on-disk configuration, so implementations never cache.

use bx_core::{BuildOptions, UserId};
use std::path::PathBuf;
use thiserror::Error;

/// Errors from resolving a user's build configuration.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("no build configuration for {user} at {}: {source}", .path.display())]
    MissingConfig {
        user: UserId,
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Maps a user to their current build configuration.
pub trait ConfigResolver: Clone + Send + Sync + 'static {
    fn resolve(&self, user: &UserId) -> Result<BuildOptions, ResolveError>;
}

/// Resolver substituting `{user}` into a path template, e.g.
/// `/home/{user}/.buildmux/build.toml`.
#[derive(Debug, Clone)]
pub struct PathTemplateResolver {
    template: String,
    logs_dir: Option<PathBuf>,
    success_message: Option<String>,
}

impl PathTemplateResolver {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            logs_dir: None,
            success_message: None,
        }
    }

    /// Give each worker a per-user log sink under `dir`.
    pub fn with_logs_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.logs_dir = Some(dir.into());
        self
    }

    /// Line logged after each successful cycle.
    pub fn with_success_message(mut self, message: impl Into<String>) -> Self {
        self.success_message = Some(message.into());
        self
    }
}

impl ConfigResolver for PathTemplateResolver {
    fn resolve(&self, user: &UserId) -> Result<BuildOptions, ResolveError> {
        let path = PathBuf::from(self.template.replace("{user}", user.as_str()));

        // Probe on every call: a config created or fixed since the last
        // reload must be picked up, a deleted one must stop resolving.
        std::fs::metadata(&path).map_err(|e| ResolveError::MissingConfig {
            user: user.clone(),
            path: path.clone(),
            source: e,
        })?;

        let mut options = BuildOptions::new(user.clone(), path);
        options.log_path = self
            .logs_dir
            .as_ref()
            .map(|dir| dir.join(format!("{user}.log")));
        options.success_message = self.success_message.clone();
        Ok(options)
    }
}

#[cfg(test)]
#[path = "resolver_tests.rs"]
mod tests;
