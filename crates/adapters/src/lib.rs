// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! bx-adapters: the process boundary of the Buildmux daemon.
//!
//! The supervisor never touches an OS process directly; it talks to a
//! [`ProcessAdapter`], which hands back a typed message channel to the
//! spawned worker. The real adapter launches `bx-workerd`; tests inject
//! [`FakeProcessAdapter`] and script the far end of the channel.

pub mod process;
pub mod wire;

pub use process::{
    ChildProcessAdapter, KillSwitch, ProcessAdapter, ProcessEvent, ProcessLink, SpawnError,
    SpawnSpec,
};
pub use wire::{FrameError, MAX_FRAME_SIZE};

#[cfg(any(test, feature = "test-support"))]
pub use process::{FakeProcessAdapter, FakeProcessHandle};
