// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Orchestrator facade: translates reload/build/wait requests into
//! registry, supervisor, and broker calls.
//!
//! Owns the single [`Registry`] instance, injected at construction and
//! torn down via [`Orchestrator::shutdown`]. Reload is close-then-replace:
//! the old worker's process is dead before the replacement becomes
//! reachable through the registry, so two live processes never coexist
//! for one user.

use bx_adapters::{ProcessAdapter, SpawnError};
use bx_core::{BuildFailure, Clock, UserId, WaitError, WatchOptions};
use bx_engine::{BuiltHook, ConfigResolver, Registry, ResolveError, Supervisor, Worker};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced to the caller that triggered a (re)load.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Spawn(#[from] SpawnError),
}

/// Outcome of waiting on a user's current build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitReply {
    /// The cycle succeeded.
    Done,
    /// The cycle failed; the worker keeps watching.
    Failed(BuildFailure),
    /// The worker crashed; it has been dropped from the registry.
    Crashed,
    /// The worker was closed while the caller waited.
    Terminated,
    /// The caller's deadline expired. Not a build failure; retry later.
    StillBuilding,
}

/// Facade over registry + supervisor + resolver.
pub struct Orchestrator<P: ProcessAdapter, R: ConfigResolver, C: Clock> {
    registry: Registry<C>,
    supervisor: Supervisor<P>,
    resolver: R,
    watch: WatchOptions,
}

impl<P: ProcessAdapter, R: ConfigResolver, C: Clock> Orchestrator<P, R, C> {
    pub fn new(
        registry: Registry<C>,
        supervisor: Supervisor<P>,
        resolver: R,
        watch: WatchOptions,
    ) -> Self {
        Self {
            registry,
            supervisor,
            resolver,
            watch,
        }
    }

    pub fn registry(&self) -> &Registry<C> {
        &self.registry
    }

    /// Force-replace the user's worker with one built from the current
    /// on-disk configuration.
    pub async fn reload(&self, user: &UserId) -> Result<Arc<Worker>, OrchestratorError> {
        self.registry.remove(user);
        self.start(user).await
    }

    /// Return the user's live worker, spawning one if absent.
    pub async fn ensure(&self, user: &UserId) -> Result<Arc<Worker>, OrchestratorError> {
        if let Some(worker) = self.registry.get(user) {
            return Ok(worker);
        }
        self.start(user).await
    }

    /// Wait for the user's current build, bounded by the caller's own
    /// deadline. An expired deadline means "still building" and cancels
    /// nothing.
    pub async fn wait(
        &self,
        user: &UserId,
        timeout: Option<Duration>,
    ) -> Result<WaitReply, OrchestratorError> {
        let worker = self.ensure(user).await?;

        let outcome = match timeout {
            Some(limit) => match tokio::time::timeout(limit, worker.when_done()).await {
                Ok(outcome) => outcome,
                Err(_) => return Ok(WaitReply::StillBuilding),
            },
            None => worker.when_done().await,
        };

        Ok(match outcome {
            Ok(()) => WaitReply::Done,
            Err(WaitError::Build(failure)) => WaitReply::Failed(failure),
            Err(WaitError::Crashed) => WaitReply::Crashed,
            Err(WaitError::Terminated) => WaitReply::Terminated,
        })
    }

    /// Close every worker. Called once at daemon shutdown.
    pub fn shutdown(&self) {
        self.registry.close_all();
    }

    async fn start(&self, user: &UserId) -> Result<Arc<Worker>, OrchestratorError> {
        // Resolve fresh so edits since the last load are picked up. On any
        // failure below, no registry entry is installed: the next access
        // attempts a fresh spawn.
        let options = self.resolver.resolve(user)?;
        let worker = self.supervisor.spawn(options).await?;
        Arc::clone(&worker).watch(self.watch.clone(), built_hook(user.clone(), &worker));

        if let Some(previous) = self.registry.set(user.clone(), Arc::clone(&worker)) {
            // A concurrent start for the same user lost the race to
            // install; close the superseded worker so only one process
            // stays live.
            if !Arc::ptr_eq(&previous, &worker) {
                previous.close();
            }
        }

        Ok(worker)
    }
}

fn built_hook(user: UserId, worker: &Arc<Worker>) -> BuiltHook {
    let worker_id = worker.id().short(8).to_string();
    Arc::new(move |notification| match &notification.error {
        Some(failure) => {
            tracing::warn!(%user, worker_id, error = %failure, "build cycle failed");
        }
        None => {
            tracing::info!(%user, worker_id, "build cycle succeeded");
        }
    })
}

#[cfg(test)]
#[path = "orchestrator_tests.rs"]
mod tests;
