// src/server/connection_loop.rs

//! Contains the main server loop for accepting connections and handling graceful shutdown.

use super::context::ServerContext;
use super::stream::AnyStream;
use crate::connection::ConnectionHandler;
use std::future::Future;
use std::time::Duration;
use tokio::signal::unix::{SignalKind, signal};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// How long open connections get to close after the shutdown broadcast.
const CONNECTION_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Resolves on the first SIGINT or SIGTERM.
pub async fn shutdown_signal() {
    let (mut sigint, mut sigterm) = match (
        signal(SignalKind::interrupt()),
        signal(SignalKind::terminate()),
    ) {
        (Ok(sigint), Ok(sigterm)) => (sigint, sigterm),
        (Err(e), _) | (_, Err(e)) => {
            error!("Failed to register signal handlers: {}. Falling back to Ctrl-C.", e);
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
            return;
        }
    };
    tokio::select! {
        _ = sigint.recv() => info!("SIGINT received, initiating graceful shutdown."),
        _ = sigterm.recv() => info!("SIGTERM received, initiating graceful shutdown."),
    }
}

/// The main server loop that accepts connections and handles graceful shutdown.
pub async fn run(mut ctx: ServerContext, shutdown: impl Future<Output = ()>) {
    let mut connection_tasks = JoinSet::new();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            biased;

            _ = &mut shutdown => break,

            Some(res) = ctx.background_tasks.join_next() => {
                match res {
                    Ok(Ok(())) => warn!("A background task finished unexpectedly without an error."),
                    Ok(Err(e)) => { error!("CRITICAL: Background task failed: {}. Shutting down.", e); break; }
                    Err(e) => { error!("CRITICAL: Background task panicked: {e:?}. Shutting down."); break; }
                }
            },

            res = ctx.listener.accept() => {
                let (socket, addr) = match res {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        error!("Failed to accept connection: {}", e);
                        continue;
                    }
                };
                let Ok(permit) = ctx.connection_permits.clone().try_acquire_owned() else {
                    warn!("Connection limit reached; rejecting {}.", addr);
                    continue;
                };
                if let Err(e) = socket.set_nodelay(true) {
                    debug!("Failed to set TCP_NODELAY for {}: {}", addr, e);
                }

                let state = ctx.state.clone();
                let acceptor = ctx.acceptor.clone();
                let shutdown_rx = ctx.shutdown_tx.subscribe();
                connection_tasks.spawn(async move {
                    let _permit = permit;
                    let stream = match AnyStream::accept(socket, acceptor.as_ref()).await {
                        Ok(stream) => stream,
                        Err(e) => {
                            warn!("TLS handshake error for {addr}: {e}");
                            return;
                        }
                    };

                    let (connection, channels) = state.open_connection(addr);
                    info!(
                        "Accepted {} connection {} from {}",
                        stream.transport(),
                        connection.id(),
                        addr
                    );
                    let handler = ConnectionHandler::new(stream, state, connection, channels, shutdown_rx);
                    match handler.run().await {
                        Ok(reason) => info!("Connection from {} closed: {}", addr, reason),
                        Err(e) => warn!("Connection from {} terminated by fault: {}", addr, e),
                    }
                });
            },

            Some(res) = connection_tasks.join_next() => {
                if let Err(e) = res
                    && e.is_panic()
                {
                    error!("A connection handler panicked: {e:?}");
                }
            },
        }
    }

    info!("Shutting down. Sending signal to all tasks.");
    // No receivers just means no connection or task is running.
    let _ = ctx.shutdown_tx.send(());

    if tokio::time::timeout(CONNECTION_DRAIN_TIMEOUT, async {
        while connection_tasks.join_next().await.is_some() {}
    })
    .await
    .is_err()
    {
        warn!("Timed out waiting for connections to close; aborting the rest.");
        connection_tasks.shutdown().await;
    }
    info!("All terminal connections closed.");

    info!("Waiting for background tasks to finish...");
    if tokio::time::timeout(Duration::from_secs(10), async {
        while ctx.background_tasks.join_next().await.is_some() {}
    })
    .await
    .is_err()
    {
        warn!("Timed out waiting for background tasks to finish cleanly.");
    };
    info!("Server shutdown complete.");
}
