// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker registry with idle eviction.
//!
//! Single owner of the `UserId → Worker` mapping. Every access refreshes
//! the entry's idle clock; a periodic sweep closes workers idle past the
//! configured threshold. All map mutation goes through one mutex, so
//! `get`/`set`/`remove` are atomic with respect to each other.
//!
//! Eviction is sweep-based: the sweeper ticks at `idle / 5`, which bounds
//! the eviction delay to the threshold plus 20% slack. A zero or absent
//! threshold disables eviction entirely.

use crate::supervisor::Worker;
use bx_core::{Clock, SystemClock, UserId, WorkerId, WorkerState};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Sweep floor so a tiny idle threshold doesn't spin the sweeper.
const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(100);

struct Entry {
    worker: Arc<Worker>,
    last_accessed: Instant,
}

/// Status snapshot of one registry entry.
#[derive(Debug, Clone)]
pub struct RegistryEntrySnapshot {
    pub user: UserId,
    pub worker_id: WorkerId,
    pub state: WorkerState,
    pub idle_for: Duration,
}

/// Process-wide `UserId → Worker` mapping. Cheap to clone; clones share
/// the underlying map.
pub struct Registry<C: Clock = SystemClock> {
    entries: Arc<Mutex<HashMap<UserId, Entry>>>,
    idle: Option<Duration>,
    clock: C,
}

impl<C: Clock> Clone for Registry<C> {
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
            idle: self.idle,
            clock: self.clock.clone(),
        }
    }
}

impl Registry<SystemClock> {
    /// Registry on the system clock. `idle = None` or zero disables
    /// eviction.
    pub fn new(idle: Option<Duration>) -> Self {
        Self::with_clock(idle, SystemClock)
    }
}

impl<C: Clock> Registry<C> {
    pub fn with_clock(idle: Option<Duration>, clock: C) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            idle: idle.filter(|d| !d.is_zero()),
            clock,
        }
    }

    /// Live worker for `user`, refreshing its idle clock.
    ///
    /// A worker that reached a terminal state is dropped on sight, so a
    /// crashed worker is never handed out and the next access respawns.
    pub fn get(&self, user: &UserId) -> Option<Arc<Worker>> {
        let mut entries = self.entries.lock();
        let entry = entries.get_mut(user)?;
        if entry.worker.state().is_terminal() {
            entries.remove(user);
            return None;
        }
        entry.last_accessed = self.clock.now();
        Some(Arc::clone(&entry.worker))
    }

    /// Install or replace the entry for `user`, refreshing its idle clock.
    ///
    /// Returns the previous worker, which the caller is responsible for
    /// having closed already — the registry never closes it implicitly.
    pub fn set(&self, user: UserId, worker: Arc<Worker>) -> Option<Arc<Worker>> {
        let mut entries = self.entries.lock();
        entries
            .insert(
                user,
                Entry {
                    worker,
                    last_accessed: self.clock.now(),
                },
            )
            .map(|entry| entry.worker)
    }

    /// Remove and close the worker for `user`. No-op when absent.
    pub fn remove(&self, user: &UserId) -> bool {
        let removed = self.entries.lock().remove(user);
        match removed {
            Some(entry) => {
                entry.worker.close();
                true
            }
            None => false,
        }
    }

    /// Close every worker idle past the threshold; returns the evicted
    /// users. Called by the sweeper, callable directly from tests.
    pub fn evict_idle(&self) -> Vec<UserId> {
        let Some(idle) = self.idle else {
            return Vec::new();
        };
        let now = self.clock.now();

        let expired: Vec<(UserId, Arc<Worker>)> = {
            let mut entries = self.entries.lock();
            let users: Vec<UserId> = entries
                .iter()
                .filter(|(_, entry)| now.duration_since(entry.last_accessed) >= idle)
                .map(|(user, _)| user.clone())
                .collect();
            users
                .into_iter()
                .filter_map(|user| {
                    entries
                        .remove(&user)
                        .map(|entry| (user, entry.worker))
                })
                .collect()
        };

        expired
            .into_iter()
            .map(|(user, worker)| {
                tracing::info!(
                    %user,
                    idle_secs = idle.as_secs(),
                    "worker was unused past the idle threshold, evicting"
                );
                worker.close();
                user
            })
            .collect()
    }

    /// Close and drop every worker. Called once at daemon shutdown.
    pub fn close_all(&self) {
        let drained: Vec<Entry> = {
            let mut entries = self.entries.lock();
            entries.drain().map(|(_, entry)| entry).collect()
        };
        for entry in drained {
            entry.worker.close();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Status view over every entry, most recently accessed first.
    pub fn snapshot(&self) -> Vec<RegistryEntrySnapshot> {
        let now = self.clock.now();
        let mut snapshot: Vec<RegistryEntrySnapshot> = self
            .entries
            .lock()
            .iter()
            .map(|(user, entry)| RegistryEntrySnapshot {
                user: user.clone(),
                worker_id: entry.worker.id().clone(),
                state: entry.worker.state(),
                idle_for: now.duration_since(entry.last_accessed),
            })
            .collect();
        snapshot.sort_by_key(|entry| entry.idle_for);
        snapshot
    }

    /// Sweep cadence implied by the idle threshold; `None` when eviction
    /// is disabled.
    pub fn sweep_interval(&self) -> Option<Duration> {
        self.idle.map(|idle| (idle / 5).max(MIN_SWEEP_INTERVAL))
    }

    /// Spawn the background sweeper task. Returns `None` when eviction is
    /// disabled.
    pub fn spawn_sweeper(&self) -> Option<tokio::task::JoinHandle<()>> {
        let interval = self.sweep_interval()?;
        let registry = self.clone();
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                registry.evict_idle();
            }
        }))
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
