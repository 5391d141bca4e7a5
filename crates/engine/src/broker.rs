// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Completion broker: fan-out of "the current build finished".
//!
//! Each worker owns one broker. Callers register a one-shot waiter;
//! `flush` resolves everyone registered at that moment with the same
//! outcome. Take-and-clear happens under a single lock, so a registration
//! is either included in a flush or left for the next one — never both.

use bx_core::WaitError;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::oneshot;

/// Outcome delivered to waiters.
pub type WaitOutcome = Result<(), WaitError>;

/// Per-worker registry of pending completion waiters.
#[derive(Clone, Default)]
pub struct CompletionBroker {
    pending: Arc<Mutex<Vec<oneshot::Sender<WaitOutcome>>>>,
}

impl CompletionBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a waiter for the next flush.
    pub fn register(&self) -> oneshot::Receiver<WaitOutcome> {
        let (tx, rx) = oneshot::channel();
        self.pending.lock().push(tx);
        rx
    }

    /// Resolve every currently pending waiter with `outcome` and clear the
    /// set. Returns how many waiters were released.
    pub fn flush(&self, outcome: WaitOutcome) -> usize {
        let waiters = std::mem::take(&mut *self.pending.lock());
        let count = waiters.len();
        for waiter in waiters {
            // A waiter that gave up (timed out, dropped) is fine to miss.
            let _ = waiter.send(outcome.clone());
        }
        count
    }

    /// Number of waiters currently pending.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }
}

#[cfg(test)]
#[path = "broker_tests.rs"]
mod tests;
