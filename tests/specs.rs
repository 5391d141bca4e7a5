//! Behavioral specifications for the Buildmux worker lifecycle.
//!
//! These tests exercise the public crate APIs end to end over the fake
//! process adapter: orchestrator → registry → supervisor → broker, with
//! the worker-process side scripted by the test.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

#[path = "specs/prelude.rs"]
mod prelude;

#[path = "specs/completion.rs"]
mod completion;
#[path = "specs/eviction.rs"]
mod eviction;
#[path = "specs/lifecycle.rs"]
mod lifecycle;
