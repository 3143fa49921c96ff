// src/core/state/core.rs

//! Defines the central `ServerState` struct, holding all shared gateway-wide state.

use super::connection::{ConnectionChannels, ConnectionHandle};
use super::stats::StatsState;
use crate::config::Config;
use crate::core::handler::MessageDispatcher;
use crate::core::handler::builtin::register_builtin_handlers;
use crate::core::message_type::MessageTypeRegistry;
use crate::core::metrics;
use crate::core::session::SessionManager;
use dashmap::DashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// The state shared by the accept loop and every connection task.
///
/// Wrapped in an `Arc` and handed to each connection; the registries inside are
/// all safe for concurrent use.
#[derive(Debug)]
pub struct ServerState {
    pub config: Config,
    /// Terminal ↔ connection bindings.
    pub sessions: SessionManager,
    /// Message ids the gateway recognizes.
    pub message_types: MessageTypeRegistry,
    /// Business handlers per message type.
    pub dispatcher: MessageDispatcher,
    /// Every open connection, keyed by connection id.
    pub connections: DashMap<u64, Arc<ConnectionHandle>>,
    pub stats: StatsState,
    next_connection_id: AtomicU64,
}

impl ServerState {
    /// Creates the state with the standard uplink message types and the
    /// built-in heartbeat and logout handlers registered.
    pub fn new(config: Config) -> Self {
        let state = Self::empty(config);
        register_builtin_handlers(&state.dispatcher);
        state
    }

    /// Creates the state with the standard message types but no handlers.
    pub fn empty(config: Config) -> Self {
        let sessions = SessionManager::new(config.session.close_superseded);
        Self {
            config,
            sessions,
            message_types: MessageTypeRegistry::with_standard_types(),
            dispatcher: MessageDispatcher::new(),
            connections: DashMap::new(),
            stats: StatsState::new(),
            next_connection_id: AtomicU64::new(1),
        }
    }

    /// Allocates a handle for a freshly accepted connection and tracks it.
    pub fn open_connection(
        &self,
        peer_addr: SocketAddr,
    ) -> (Arc<ConnectionHandle>, ConnectionChannels) {
        let id = self.next_connection_id.fetch_add(1, Ordering::Relaxed);
        let (handle, channels) = ConnectionHandle::new(
            id,
            peer_addr,
            self.config.session.outbound_queue_capacity,
        );
        self.connections.insert(id, handle.clone());
        self.stats.increment_total_connections();
        metrics::CONNECTIONS_ACCEPTED_TOTAL.inc();
        metrics::CONNECTED_TERMINALS.set(self.connections.len() as f64);
        (handle, channels)
    }

    /// Stops tracking a connection whose event loop has exited.
    pub fn release_connection(&self, connection_id: u64) {
        self.connections.remove(&connection_id);
        metrics::CONNECTED_TERMINALS.set(self.connections.len() as f64);
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }
}
