// src/server/mod.rs

//! The TCP front end: listener setup, the accept loop and background tasks.

use crate::config::Config;
use crate::core::state::ServerState;
use anyhow::Result;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;

mod connection_loop;
mod context;
mod initialization;
mod metrics_server;
mod spawner;
mod stream;

pub use stream::AnyStream;

/// Starts the gateway with the built-in handlers and runs until SIGINT or SIGTERM.
pub async fn run(config: Config) -> Result<()> {
    run_with_state(Arc::new(ServerState::new(config))).await
}

/// Starts the gateway around a prepared state, so embedders can register their
/// own message types and handlers first.
pub async fn run_with_state(state: Arc<ServerState>) -> Result<()> {
    // 1. Bind the listener and load TLS material.
    let mut server_context = initialization::setup(state).await?;

    // 2. Spawn background tasks.
    spawner::spawn_all(&mut server_context);

    // 3. Accept connections until a shutdown signal arrives.
    connection_loop::run(server_context, connection_loop::shutdown_signal()).await;
    Ok(())
}

/// Serves plain TCP on an already bound listener until `shutdown` resolves.
///
/// Open connections are closed with `SERVER_SHUTDOWN` before this returns.
pub async fn serve(
    state: Arc<ServerState>,
    listener: TcpListener,
    shutdown: impl Future<Output = ()>,
) {
    let server_context = context::ServerContext::new(state, listener, None);
    connection_loop::run(server_context, shutdown).await;
}
