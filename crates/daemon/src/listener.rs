// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Listener task for handling socket I/O.
//!
//! Accepts connections and serves each on its own task, so a caller
//! blocked in a long `Build` wait never stalls another user's request.
//! Username validation happens here: nothing malformed reaches the
//! registry.

use std::sync::Arc;

use bx_adapters::ProcessAdapter;
use bx_core::{Clock, UserId};
use bx_engine::ConfigResolver;
use thiserror::Error;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::Notify;
use tracing::{debug, error, warn};

use crate::orchestrator::{Orchestrator, OrchestratorError, WaitReply};
use crate::protocol::{self, ErrorKind, Request, Response, DEFAULT_TIMEOUT};

/// Listener task for accepting socket connections.
pub struct Listener<P: ProcessAdapter, R: ConfigResolver, C: Clock> {
    socket: UnixListener,
    orchestrator: Arc<Orchestrator<P, R, C>>,
    shutdown: Arc<Notify>,
}

/// Errors from connection handling.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("Protocol error: {0}")]
    Protocol(#[from] protocol::ProtocolError),
}

impl<P: ProcessAdapter, R: ConfigResolver, C: Clock> Listener<P, R, C> {
    pub fn new(
        socket: UnixListener,
        orchestrator: Arc<Orchestrator<P, R, C>>,
        shutdown: Arc<Notify>,
    ) -> Self {
        Self {
            socket,
            orchestrator,
            shutdown,
        }
    }

    /// Run the listener loop, spawning a task per connection.
    pub async fn run(self) {
        loop {
            match self.socket.accept().await {
                Ok((stream, _)) => {
                    let orchestrator = Arc::clone(&self.orchestrator);
                    let shutdown = Arc::clone(&self.shutdown);

                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, orchestrator, shutdown).await {
                            match e {
                                ConnectionError::Protocol(protocol::ProtocolError::Frame(
                                    bx_adapters::FrameError::ConnectionClosed,
                                )) => debug!("Client disconnected"),
                                ConnectionError::Protocol(protocol::ProtocolError::Timeout) => {
                                    warn!("Connection timeout")
                                }
                                _ => error!("Connection error: {}", e),
                            }
                        }
                    });
                }
                Err(e) => {
                    error!("Accept error: {}", e);
                }
            }
        }
    }
}

/// Handle a single client connection: one request, one response.
async fn handle_connection<P: ProcessAdapter, R: ConfigResolver, C: Clock>(
    stream: UnixStream,
    orchestrator: Arc<Orchestrator<P, R, C>>,
    shutdown: Arc<Notify>,
) -> Result<(), ConnectionError> {
    let (mut reader, mut writer) = stream.into_split();

    let request = protocol::read_request(&mut reader, DEFAULT_TIMEOUT).await?;
    debug!(?request, "handling request");

    let response = dispatch(request, &orchestrator, &shutdown).await;
    protocol::write_response(&mut writer, &response, DEFAULT_TIMEOUT).await?;
    Ok(())
}

/// Translate one request into orchestrator calls.
async fn dispatch<P: ProcessAdapter, R: ConfigResolver, C: Clock>(
    request: Request,
    orchestrator: &Orchestrator<P, R, C>,
    shutdown: &Notify,
) -> Response {
    match request {
        Request::Ping => Response::Pong,

        Request::Reload { user } => {
            let user = match validate(&user) {
                Ok(user) => user,
                Err(response) => return response,
            };
            match orchestrator.reload(&user).await {
                Ok(_) => Response::Reloaded,
                Err(e) => error_response(e),
            }
        }

        Request::Build { user, timeout_ms } => {
            let user = match validate(&user) {
                Ok(user) => user,
                Err(response) => return response,
            };
            let timeout = timeout_ms.map(std::time::Duration::from_millis);
            match orchestrator.wait(&user, timeout).await {
                Ok(WaitReply::Done) => Response::Done,
                Ok(WaitReply::StillBuilding) => Response::StillBuilding,
                Ok(WaitReply::Failed(failure)) => Response::BuildFailed { error: failure },
                Ok(WaitReply::Crashed) => Response::Error {
                    kind: ErrorKind::Crashed,
                    message: "worker process crashed".to_string(),
                },
                Ok(WaitReply::Terminated) => Response::Error {
                    kind: ErrorKind::Terminated,
                    message: "worker terminated while waiting".to_string(),
                },
                Err(e) => error_response(e),
            }
        }

        Request::Status => {
            let workers = orchestrator
                .registry()
                .snapshot()
                .into_iter()
                .map(|entry| crate::protocol::WorkerEntry {
                    user: entry.user.to_string(),
                    worker_id: entry.worker_id.to_string(),
                    state: entry.state,
                    idle_secs: entry.idle_for.as_secs(),
                })
                .collect();
            Response::Status { workers }
        }

        Request::Shutdown => {
            shutdown.notify_one();
            Response::ShuttingDown
        }
    }
}

fn validate(user: &str) -> Result<UserId, Response> {
    UserId::parse(user).map_err(|e| Response::Error {
        kind: ErrorKind::InvalidIdentifier,
        message: e.to_string(),
    })
}

fn error_response(error: OrchestratorError) -> Response {
    let kind = match &error {
        OrchestratorError::Resolve(_) => ErrorKind::MissingConfig,
        OrchestratorError::Spawn(_) => ErrorKind::SpawnFailed,
    };
    Response::Error {
        kind,
        message: error.to_string(),
    }
}

#[cfg(test)]
#[path = "listener_tests.rs"]
mod tests;
