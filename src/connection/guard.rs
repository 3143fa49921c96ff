// src/connection/guard.rs

//! Defines `ConnectionGuard`, an RAII guard for connection resource management.

use crate::core::session::CloseReason;
use crate::core::state::{ConnectionHandle, ServerState};
use std::sync::Arc;
use tracing::{debug, warn};

/// Ensures a connection is forgotten by the server state however its event
/// loop exits, including by panic or task abort.
pub struct ConnectionGuard {
    state: Arc<ServerState>,
    connection: Arc<ConnectionHandle>,
}

impl ConnectionGuard {
    pub(crate) fn new(state: Arc<ServerState>, connection: Arc<ConnectionHandle>) -> Self {
        Self { state, connection }
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        debug!(
            "ConnectionGuard dropping, cleaning up resources for connection {} ({})",
            self.connection.id(),
            self.connection.peer_addr()
        );

        // The event loop closes normally before the guard drops. Reaching this
        // branch means it unwound without doing so.
        if !self.connection.is_closed() {
            warn!(
                "Connection {} exited without closing; removing its session.",
                self.connection.peer_addr()
            );
            let session_id = self.state.sessions.session_id_for(&self.connection);
            self.state
                .sessions
                .remove_and_close(session_id, CloseReason::ServerExceptionOccurred);
            self.connection.close(CloseReason::ServerExceptionOccurred);
        }

        self.state.release_connection(self.connection.id());
    }
}
