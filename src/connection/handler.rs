// src/connection/handler.rs

//! Defines the `ConnectionHandler` which manages the full lifecycle of a terminal connection.

use super::guard::ConnectionGuard;
use super::processor::{FrameOutcome, FrameProcessor};
use crate::core::Jt808Error;
use crate::core::metrics;
use crate::core::protocol::{Jt808FrameCodec, escape};
use crate::core::session::CloseReason;
use crate::core::state::{ConnectionChannels, ConnectionHandle, ConnectionPhase, ServerState};
use bytes::{Bytes, BytesMut};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::broadcast;
use tokio::time::Instant;
use tokio_util::codec::Framed;
use tracing::{debug, error, info, warn};

/// Why the event loop stopped.
enum LoopExit {
    Closed(CloseReason),
    Fault(Jt808Error),
}

/// Owns one terminal socket and processes its events sequentially.
pub struct ConnectionHandler<S> {
    framed: Framed<S, Jt808FrameCodec>,
    state: Arc<ServerState>,
    connection: Arc<ConnectionHandle>,
    channels: ConnectionChannels,
    shutdown_rx: broadcast::Receiver<()>,
}

impl<S> ConnectionHandler<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(
        stream: S,
        state: Arc<ServerState>,
        connection: Arc<ConnectionHandle>,
        channels: ConnectionChannels,
        shutdown_rx: broadcast::Receiver<()>,
    ) -> Self {
        let codec = Jt808FrameCodec::new(state.config.protocol.max_frame_length);
        Self {
            framed: Framed::new(stream, codec),
            state,
            connection,
            channels,
            shutdown_rx,
        }
    }

    /// The main event loop. Returns the reason the connection closed, or the
    /// fault that closed it with `SERVER_EXCEPTION_OCCURRED`.
    pub async fn run(mut self) -> Result<CloseReason, Jt808Error> {
        let _guard = ConnectionGuard::new(self.state.clone(), self.connection.clone());
        let idle_timeout = self.state.config.session.idle_timeout();
        let mut idle_deadline = idle_timeout.map(|d| Instant::now() + d);

        let exit = loop {
            tokio::select! {
                // Shutdown and close requests win over pending data.
                biased;
                _ = self.shutdown_rx.recv() => {
                    info!("Connection {} received shutdown signal.", self.connection.peer_addr());
                    break LoopExit::Closed(CloseReason::ServerShutdown);
                }
                _ = self.channels.close_rx.recv() => {
                    let reason = self
                        .connection
                        .close_reason()
                        .unwrap_or(CloseReason::ServerExceptionOccurred);
                    break LoopExit::Closed(reason);
                }
                Some(message) = self.channels.outbound_rx.recv() => {
                    if let Err(e) = self.write_message(message).await {
                        break self.exit_on_error(e);
                    }
                }
                result = self.framed.next() => match result {
                    Some(Ok(frame)) => {
                        idle_deadline = idle_timeout.map(|d| Instant::now() + d);
                        if let Err(e) = self.on_frame(frame).await {
                            break LoopExit::Fault(e);
                        }
                    }
                    Some(Err(e)) => break self.exit_on_error(e),
                    None => {
                        debug!("Connection from {} closed by peer.", self.connection.peer_addr());
                        break LoopExit::Closed(CloseReason::ChannelInactive);
                    }
                },
                _ = idle(idle_deadline) => {
                    info!(
                        "Connection {} idle for {:?}, closing.",
                        self.connection.peer_addr(),
                        idle_timeout.unwrap_or_default()
                    );
                    break LoopExit::Closed(CloseReason::IdleTimeout);
                }
            }
        };

        match exit {
            LoopExit::Closed(reason) => {
                self.close(reason).await;
                Ok(reason)
            }
            LoopExit::Fault(e) => {
                match &e {
                    Jt808Error::Decode(_) => metrics::DECODE_ERRORS_TOTAL.inc(),
                    Jt808Error::HandlerFault { .. } => metrics::HANDLER_FAULTS_TOTAL.inc(),
                    _ => {}
                }
                self.state.stats.increment_faulted_connections();
                error!(
                    "Closing connection {} after fault: {}",
                    self.connection.peer_addr(),
                    e
                );
                self.close(CloseReason::ServerExceptionOccurred).await;
                Err(e)
            }
        }
    }

    /// Runs one frame through the processing chain and writes any responses.
    async fn on_frame(&mut self, frame: BytesMut) -> Result<(), Jt808Error> {
        self.connection.set_phase(ConnectionPhase::Processing);
        let outcome = FrameProcessor::new(&self.state, &self.connection)
            .process(frame)
            .await?;
        if let FrameOutcome::Handled { responses } = outcome
            && !responses.is_empty()
        {
            for response in responses {
                self.framed.feed(response).await?;
            }
            self.framed.flush().await?;
        }
        self.connection.set_phase(ConnectionPhase::Open);
        Ok(())
    }

    /// Writes a message queued through the session registry.
    async fn write_message(&mut self, message: Bytes) -> Result<(), Jt808Error> {
        self.framed.send(escape(&message).freeze()).await
    }

    fn exit_on_error(&self, e: Jt808Error) -> LoopExit {
        if e.is_normal_disconnect() {
            debug!(
                "Connection from {} closed by peer: {}",
                self.connection.peer_addr(),
                e
            );
            LoopExit::Closed(e.close_reason())
        } else {
            warn!("Connection error for {}: {}", self.connection.peer_addr(), e);
            LoopExit::Fault(e)
        }
    }

    /// Removes the session and marks the connection closed. Both steps are
    /// no-ops if another path got there first.
    async fn close(&mut self, reason: CloseReason) {
        self.connection.set_phase(ConnectionPhase::Closed);
        let session_id = self.state.sessions.session_id_for(&self.connection);
        self.state.sessions.remove_and_close(session_id, reason);
        self.connection.close(reason);
        if let Err(e) = self.framed.get_mut().shutdown().await {
            debug!(
                "Shutdown of {} failed: {}",
                self.connection.peer_addr(),
                e
            );
        }
    }
}

async fn idle(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
