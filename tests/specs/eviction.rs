//! Idle eviction: unused workers are torn down within the configured
//! threshold (plus sweep slack), and re-accessed workers are spared.

use crate::prelude::*;
use bx_core::WorkerState;
use std::time::Duration;

#[tokio::test]
async fn unused_worker_is_gone_within_the_slack_bound() {
    // idleSeconds = 10: last access at t=0, no further access. By t=12
    // (threshold + 20% slack) the entry is gone and the process dead.
    let h = harness(&["bob"], Some(Duration::from_secs(10)));
    let worker = h.orchestrator.ensure(&user("bob")).await.unwrap();

    h.clock.advance(Duration::from_secs(12));
    h.orchestrator.registry().evict_idle();

    assert!(h.orchestrator.registry().is_empty());
    assert_eq!(worker.state(), WorkerState::Closed);
    assert!(h.adapter.last_handle().unwrap().killed());
}

#[tokio::test]
async fn worker_is_not_evicted_before_the_threshold() {
    let h = harness(&["bob"], Some(Duration::from_secs(10)));
    h.orchestrator.ensure(&user("bob")).await.unwrap();

    h.clock.advance(Duration::from_millis(9_999));
    h.orchestrator.registry().evict_idle();
    assert_eq!(h.orchestrator.registry().len(), 1);
}

#[tokio::test]
async fn re_access_restarts_the_idle_clock() {
    let h = harness(&["bob"], Some(Duration::from_secs(10)));
    h.orchestrator.ensure(&user("bob")).await.unwrap();

    // Touch the worker just before the deadline.
    h.clock.advance(Duration::from_secs(9));
    assert!(h.orchestrator.registry().get(&user("bob")).is_some());

    // The original deadline passes: still alive.
    h.clock.advance(Duration::from_secs(9));
    h.orchestrator.registry().evict_idle();
    assert_eq!(h.orchestrator.registry().len(), 1);

    // The refreshed deadline passes: evicted.
    h.clock.advance(Duration::from_secs(2));
    h.orchestrator.registry().evict_idle();
    assert!(h.orchestrator.registry().is_empty());
}

#[tokio::test]
async fn disabled_eviction_keeps_workers_forever() {
    let h = harness(&["bob"], None);
    h.orchestrator.ensure(&user("bob")).await.unwrap();

    h.clock.advance(Duration::from_secs(1_000_000));
    h.orchestrator.registry().evict_idle();
    assert_eq!(h.orchestrator.registry().len(), 1);
}

#[tokio::test]
async fn sweep_cadence_meets_the_slack_bound() {
    // A sweep every idle/5 means a worker overshoots its deadline by at
    // most 20% before the next sweep catches it.
    let h = harness(&[], Some(Duration::from_secs(10)));
    assert_eq!(
        h.orchestrator.registry().sweep_interval(),
        Some(Duration::from_secs(2))
    );
}
