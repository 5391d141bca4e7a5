//! Worker lifecycle: one live worker per user, atomic reload, clean
//! failure handling.

use crate::prelude::*;
use bx_core::{UserId, WorkerState};

#[tokio::test]
async fn at_most_one_live_worker_per_user() {
    let h = harness(&["alice"], None);

    // A run of reloads without intervening removes: after each, exactly
    // one worker for the user is non-closed.
    let mut previous = h.orchestrator.ensure(&user("alice")).await.unwrap();
    for _ in 0..3 {
        let current = h.orchestrator.reload(&user("alice")).await.unwrap();
        assert_eq!(previous.state(), WorkerState::Closed);
        assert!(!current.state().is_terminal());
        previous = current;
    }

    assert_eq!(h.orchestrator.registry().len(), 1);
    assert_eq!(h.adapter.spawn_count(), 4);
}

#[tokio::test]
async fn reload_kills_the_old_process_before_the_new_one_is_reachable() {
    let h = harness(&["alice"], None);

    let old = h.orchestrator.ensure(&user("alice")).await.unwrap();
    let old_handle = h.adapter.last_handle().unwrap();

    let new = h.orchestrator.reload(&user("alice")).await.unwrap();

    assert!(old_handle.killed());
    assert_eq!(old.state(), WorkerState::Closed);

    let reachable = h.orchestrator.registry().get(&user("alice")).unwrap();
    assert_eq!(reachable.id(), new.id());
    assert_ne!(reachable.id(), old.id());
}

#[tokio::test]
async fn failed_reload_leaves_no_half_installed_worker() {
    let h = harness(&["alice"], None);
    h.orchestrator.ensure(&user("alice")).await.unwrap();

    // The replacement spawn fails: the old worker is gone (closed during
    // reload) and nothing dead is left behind in the registry.
    h.adapter.fail_next_spawn();
    assert!(h.orchestrator.reload(&user("alice")).await.is_err());
    assert!(h.orchestrator.registry().is_empty());

    // The next access spawns fresh.
    assert!(h.orchestrator.ensure(&user("alice")).await.is_ok());
    assert_eq!(h.orchestrator.registry().len(), 1);
}

#[tokio::test]
async fn usernames_are_validated_before_anything_else() {
    for bad in ["", "../etc", "a b", "semi;colon", "ålice"] {
        assert!(UserId::parse(bad).is_err(), "{bad:?} should be rejected");
    }
    for good in ["alice", "user2", "build-bot", "ci_runner"] {
        assert!(UserId::parse(good).is_ok(), "{good:?} should be accepted");
    }
}

#[tokio::test]
async fn shutdown_closes_every_user() {
    let h = harness(&["alice", "bob", "carol"], None);
    let mut workers = Vec::new();
    for name in ["alice", "bob", "carol"] {
        workers.push(h.orchestrator.ensure(&user(name)).await.unwrap());
    }

    h.orchestrator.shutdown();

    assert!(h.orchestrator.registry().is_empty());
    for worker in workers {
        assert_eq!(worker.state(), WorkerState::Closed);
    }
}
