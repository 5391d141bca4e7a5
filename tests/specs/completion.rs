//! Completion fan-out: every waiter present at an event sees the same
//! outcome; late joiners reconcile against last-known state.

use crate::prelude::*;
use bx_core::{BuildFailure, SupervisorMsg, WaitError};
use std::sync::Arc;

#[tokio::test]
async fn three_waiters_resolve_together_and_a_fourth_reconciles() {
    let h = harness(&["alice"], None);
    let worker = h.orchestrator.ensure(&user("alice")).await.unwrap();

    // Three callers wait on the same build.
    let waiters: Vec<_> = (0..3)
        .map(|_| {
            let worker = Arc::clone(&worker);
            tokio::spawn(async move { worker.when_done().await })
        })
        .collect();
    {
        let worker = Arc::clone(&worker);
        wait_until(move || worker.pending_waiters() == 3).await;
    }

    let handle = h.adapter.last_handle().unwrap();
    handle.emit_built(None).await;

    for waiter in waiters {
        assert_eq!(waiter.await.unwrap(), Ok(()));
    }

    // A fourth caller arriving after the cycle (and before any new one)
    // resolves immediately via the IsRunning/NotRunning reconciliation.
    let fourth = {
        let worker = Arc::clone(&worker);
        tokio::spawn(async move { worker.when_done().await })
    };
    {
        let handle = handle.clone();
        wait_until(move || {
            handle
                .received_commands()
                .iter()
                .filter(|msg| **msg == SupervisorMsg::IsRunning)
                .count()
                >= 4
        })
        .await;
    }
    handle.emit_not_running(None).await;
    assert_eq!(fourth.await.unwrap(), Ok(()));
}

#[tokio::test]
async fn failed_cycle_delivers_the_same_error_to_every_waiter() {
    let h = harness(&["alice"], None);
    let worker = h.orchestrator.ensure(&user("alice")).await.unwrap();

    let waiters: Vec<_> = (0..5)
        .map(|_| {
            let worker = Arc::clone(&worker);
            tokio::spawn(async move { worker.when_done().await })
        })
        .collect();
    {
        let worker = Arc::clone(&worker);
        wait_until(move || worker.pending_waiters() == 5).await;
    }

    let failure = BuildFailure::with_exit_code("tsc: 2 errors", 1);
    h.adapter
        .last_handle()
        .unwrap()
        .emit_built(Some(failure.clone()))
        .await;

    for waiter in waiters {
        assert_eq!(waiter.await.unwrap(), Err(WaitError::Build(failure.clone())));
    }
}

#[tokio::test]
async fn crash_fails_every_pending_waiter_and_poisons_the_worker() {
    let h = harness(&["alice"], None);
    let worker = h.orchestrator.ensure(&user("alice")).await.unwrap();

    let waiters: Vec<_> = (0..3)
        .map(|_| {
            let worker = Arc::clone(&worker);
            tokio::spawn(async move { worker.when_done().await })
        })
        .collect();
    {
        let worker = Arc::clone(&worker);
        wait_until(move || worker.pending_waiters() == 3).await;
    }

    h.adapter.last_handle().unwrap().exit(Some(139)).await;

    for waiter in waiters {
        assert_eq!(waiter.await.unwrap(), Err(WaitError::Crashed));
    }

    // The registry no longer returns a usable worker for the user until a
    // new one is spawned.
    assert!(h.orchestrator.registry().get(&user("alice")).is_none());
    let replacement = h.orchestrator.ensure(&user("alice")).await.unwrap();
    assert_ne!(replacement.id(), worker.id());
}
