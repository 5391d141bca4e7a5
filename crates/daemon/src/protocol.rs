// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Control protocol for the daemon socket.
//!
//! Same wire format as the worker IPC: 4-byte length prefix (big-endian)
//! + JSON payload. One request/response exchange per connection.

use bx_adapters::wire::{self, FrameError};
use bx_core::{BuildFailure, WorkerState};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Protocol errors
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error("Timeout")]
    Timeout,
}

/// Default IPC timeout for a single read or write on the control socket.
pub const DEFAULT_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);

/// Request from a client to the daemon
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Health check ping
    Ping,

    /// Tear down the user's worker (if any) and start a fresh one from
    /// the current on-disk configuration
    Reload { user: String },

    /// Ensure the user has a worker and wait for its current build.
    /// `timeout_ms` bounds the wait only; the build itself is never
    /// cancelled by an expired wait.
    Build {
        user: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout_ms: Option<u64>,
    },

    /// Get daemon status
    Status,

    /// Request daemon shutdown
    Shutdown,
}

/// Status view of one worker, as reported over the socket.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkerEntry {
    pub user: String,
    pub worker_id: String,
    pub state: WorkerState,
    pub idle_secs: u64,
}

/// Error categories a client can dispatch on.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed username; rejected before touching the registry
    InvalidIdentifier,
    /// The user's build configuration could not be resolved
    MissingConfig,
    /// The worker process could not be created
    SpawnFailed,
    /// The worker process died unexpectedly
    Crashed,
    /// The worker was closed while the caller waited
    Terminated,
    /// Anything else
    Internal,
}

/// Response from the daemon
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    Pong,

    /// Reload finished; a fresh worker is watching
    Reloaded,

    /// The awaited build cycle succeeded
    Done,

    /// The caller's deadline expired; the build is still going. Retry
    /// later — this is not a build failure.
    StillBuilding,

    /// The awaited build cycle failed
    BuildFailed { error: BuildFailure },

    Status { workers: Vec<WorkerEntry> },

    ShuttingDown,

    Error { kind: ErrorKind, message: String },
}

/// Read a request with timeout
pub async fn read_request<R: tokio::io::AsyncReadExt + Unpin>(
    reader: &mut R,
    timeout: std::time::Duration,
) -> Result<Request, ProtocolError> {
    let bytes = tokio::time::timeout(timeout, wire::read_frame(reader))
        .await
        .map_err(|_| ProtocolError::Timeout)??;
    Ok(wire::decode(&bytes)?)
}

/// Write a request with timeout
pub async fn write_request<W: tokio::io::AsyncWriteExt + Unpin>(
    writer: &mut W,
    request: &Request,
    timeout: std::time::Duration,
) -> Result<(), ProtocolError> {
    let data = wire::encode(request)?;
    tokio::time::timeout(timeout, wire::write_frame(writer, &data))
        .await
        .map_err(|_| ProtocolError::Timeout)?
        .map_err(ProtocolError::Frame)
}

/// Read a response with timeout
pub async fn read_response<R: tokio::io::AsyncReadExt + Unpin>(
    reader: &mut R,
    timeout: std::time::Duration,
) -> Result<Response, ProtocolError> {
    let bytes = tokio::time::timeout(timeout, wire::read_frame(reader))
        .await
        .map_err(|_| ProtocolError::Timeout)??;
    Ok(wire::decode(&bytes)?)
}

/// Write a response with timeout
pub async fn write_response<W: tokio::io::AsyncWriteExt + Unpin>(
    writer: &mut W,
    response: &Response,
    timeout: std::time::Duration,
) -> Result<(), ProtocolError> {
    let data = wire::encode(response)?;
    tokio::time::timeout(timeout, wire::write_frame(writer, &data))
        .await
        .map_err(|_| ProtocolError::Timeout)?
        .map_err(ProtocolError::Frame)
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
