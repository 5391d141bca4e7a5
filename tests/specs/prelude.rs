//! Shared harness for the spec suite.

use bx_adapters::FakeProcessAdapter;
use bx_core::{FakeClock, UserId, WatchOptions};
use bx_daemon::Orchestrator;
use bx_engine::{PathTemplateResolver, Registry, Supervisor};
use std::time::Duration;
use tempfile::TempDir;

pub type SpecOrchestrator = Orchestrator<FakeProcessAdapter, PathTemplateResolver, FakeClock>;

pub struct Harness {
    pub orchestrator: SpecOrchestrator,
    pub adapter: FakeProcessAdapter,
    pub clock: FakeClock,
    _dir: TempDir,
}

/// Orchestrator over a fake process adapter, with build files on disk
/// for each named user and a controllable clock.
pub fn harness(users: &[&str], idle: Option<Duration>) -> Harness {
    let dir = tempfile::tempdir().expect("tempdir");
    for name in users {
        let config = dir.path().join(name).join("build.toml");
        std::fs::create_dir_all(config.parent().expect("parent")).expect("mkdir");
        std::fs::write(&config, "command = \"true\"\n").expect("write build file");
    }

    let clock = FakeClock::new();
    let adapter = FakeProcessAdapter::new();
    let orchestrator = Orchestrator::new(
        Registry::with_clock(idle, clock.clone()),
        Supervisor::new(adapter.clone()),
        PathTemplateResolver::new(format!("{}/{{user}}/build.toml", dir.path().display())),
        WatchOptions::default(),
    );

    Harness {
        orchestrator,
        adapter,
        clock,
        _dir: dir,
    }
}

pub fn user(name: &str) -> UserId {
    UserId::parse(name).expect("valid user")
}

/// Poll until `condition` holds, failing after one second.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..1000 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    panic!("condition not reached within 1s");
}
