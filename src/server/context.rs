// src/server/context.rs

use crate::core::state::ServerState;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{Semaphore, broadcast};
use tokio::task::JoinSet;
use tokio_rustls::TlsAcceptor;

/// Holds all the initialized state required to run the server's main loop.
pub struct ServerContext {
    pub state: Arc<ServerState>,
    pub listener: TcpListener,
    pub shutdown_tx: broadcast::Sender<()>,
    pub background_tasks: JoinSet<Result<(), anyhow::Error>>,
    pub acceptor: Option<TlsAcceptor>,
    /// Caps concurrently open terminal connections at `max_connections`.
    pub connection_permits: Arc<Semaphore>,
}

impl ServerContext {
    pub fn new(
        state: Arc<ServerState>,
        listener: TcpListener,
        acceptor: Option<TlsAcceptor>,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        let connection_permits = Arc::new(Semaphore::new(state.config.max_connections));
        Self {
            state,
            listener,
            shutdown_tx,
            background_tasks: JoinSet::new(),
            acceptor,
            connection_permits,
        }
    }
}
