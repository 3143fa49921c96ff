// src/core/session/manager.rs

//! The process-wide registry of live sessions.
//!
//! Sessions are indexed by session id and by terminal id behind a single lock,
//! so a bind replaces both index entries atomically. When two connections race
//! to bind the same terminal id, the last writer wins; the loser's later
//! `remove_and_close` finds nothing under its session id and does nothing.

use super::record::{BindOutcome, CloseReason, Session, SessionId};
use crate::core::Jt808Error;
use crate::core::metrics;
use crate::core::state::ConnectionHandle;
use bytes::Bytes;
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Default)]
struct SessionIndex {
    by_session: HashMap<SessionId, Session>,
    by_terminal: HashMap<String, SessionId>,
}

impl SessionIndex {
    fn bind(&mut self, terminal_id: &str, connection: &Arc<ConnectionHandle>) -> BindOutcome {
        let session_id = SessionId::of(connection);

        if self.by_terminal.get(terminal_id) == Some(&session_id)
            && let Some(session) = self.by_session.get_mut(&session_id)
        {
            session.last_bound_at = Utc::now();
            return BindOutcome::Refreshed;
        }

        // The connection was bound under another terminal id before.
        if let Some(stale) = self.by_session.remove(&session_id) {
            if self.by_terminal.get(&stale.terminal_id) == Some(&session_id) {
                self.by_terminal.remove(&stale.terminal_id);
            }
            debug!(
                "Session {} switches from terminal {} to {}",
                session_id, stale.terminal_id, terminal_id
            );
        }

        let previous = self
            .by_terminal
            .insert(terminal_id.to_string(), session_id)
            .and_then(|old_id| self.by_session.remove(&old_id));
        self.by_session
            .insert(session_id, Session::new(terminal_id, connection));

        match previous {
            Some(mut previous) => {
                previous.close_reason = Some(CloseReason::SessionReplaced);
                BindOutcome::Replaced { previous }
            }
            None => BindOutcome::Created,
        }
    }

    fn remove(&mut self, session_id: SessionId) -> Option<Session> {
        let removed = self.by_session.remove(&session_id);
        if let Some(session) = &removed
            && self.by_terminal.get(&session.terminal_id) == Some(&session_id)
        {
            self.by_terminal.remove(&session.terminal_id);
        }
        removed
    }
}

/// Maintains the terminal ↔ connection mapping shared by every connection.
#[derive(Debug, Default)]
pub struct SessionManager {
    index: RwLock<SessionIndex>,
    /// Physically close a connection whose terminal was bound elsewhere.
    close_superseded: bool,
}

impl SessionManager {
    pub fn new(close_superseded: bool) -> Self {
        Self {
            index: RwLock::new(SessionIndex::default()),
            close_superseded,
        }
    }

    /// The session id used for `connection`. Pure and stable for the
    /// connection's lifetime.
    pub fn session_id_for(&self, connection: &ConnectionHandle) -> SessionId {
        SessionId::of(connection)
    }

    /// Binds `terminal_id` to `connection`, creating, refreshing or replacing
    /// the session as needed. Safe to call for every inbound message.
    pub fn bind_if_absent(
        &self,
        terminal_id: &str,
        connection: &Arc<ConnectionHandle>,
    ) -> BindOutcome {
        let outcome = {
            let mut index = self.index.write();
            let outcome = index.bind(terminal_id, connection);
            metrics::ACTIVE_SESSIONS.set(index.by_session.len() as f64);
            outcome
        };

        match &outcome {
            BindOutcome::Created => info!(
                "Session {} created for terminal {} ({})",
                SessionId::of(connection),
                terminal_id,
                connection.peer_addr()
            ),
            BindOutcome::Refreshed => {}
            BindOutcome::Replaced { previous } => {
                info!(
                    "Terminal {} moved from session {} to {} ({})",
                    terminal_id,
                    previous.session_id,
                    SessionId::of(connection),
                    connection.peer_addr()
                );
                metrics::SESSIONS_CLOSED_TOTAL
                    .with_label_values(&[CloseReason::SessionReplaced.as_ref()])
                    .inc();
                if self.close_superseded
                    && let Some(old_connection) = previous.connection()
                {
                    old_connection.close(CloseReason::SessionReplaced);
                }
            }
        }
        outcome
    }

    /// Removes the session and asks its connection to close.
    ///
    /// Returns the removed session stamped with `reason`, or `None` if nothing
    /// was bound under `session_id` (already removed, superseded, or never bound).
    pub fn remove_and_close(&self, session_id: SessionId, reason: CloseReason) -> Option<Session> {
        let removed = {
            let mut index = self.index.write();
            let removed = index.remove(session_id);
            metrics::ACTIVE_SESSIONS.set(index.by_session.len() as f64);
            removed
        };

        let Some(mut session) = removed else {
            debug!("No session {} to remove ({})", session_id, reason);
            return None;
        };
        session.close_reason = Some(reason);
        info!(
            "Session {} for terminal {} removed: {}",
            session_id, session.terminal_id, reason
        );
        metrics::SESSIONS_CLOSED_TOTAL
            .with_label_values(&[reason.as_ref()])
            .inc();

        if let Some(connection) = session.connection() {
            connection.close(reason);
        }
        Some(session)
    }

    pub fn find_by_terminal_id(&self, terminal_id: &str) -> Option<Session> {
        let index = self.index.read();
        index
            .by_terminal
            .get(terminal_id)
            .and_then(|id| index.by_session.get(id))
            .cloned()
    }

    pub fn find_by_session_id(&self, session_id: SessionId) -> Option<Session> {
        self.index.read().by_session.get(&session_id).cloned()
    }

    pub fn count(&self) -> usize {
        self.index.read().by_session.len()
    }

    /// A snapshot of every live session.
    pub fn sessions(&self) -> Vec<Session> {
        self.index.read().by_session.values().cloned().collect()
    }

    /// Queues an unescaped message for the connection bound to `terminal_id`.
    pub fn send_to_terminal(&self, terminal_id: &str, message: Bytes) -> Result<(), Jt808Error> {
        self.find_by_terminal_id(terminal_id)
            .ok_or_else(|| Jt808Error::TerminalNotFound(terminal_id.to_string()))?
            .send(message)
    }
}
