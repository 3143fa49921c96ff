// src/core/session/record.rs

//! Defines the record binding a terminal id to a live connection.

use crate::core::Jt808Error;
use crate::core::state::ConnectionHandle;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::{Arc, Weak};
use strum_macros::{AsRefStr, Display, EnumString};

/// Identifies a session. Derived from the connection id, so it stays the same
/// for the whole life of the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    pub fn of(connection: &ConnectionHandle) -> Self {
        Self(connection.id())
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum CloseReason {
    /// The terminal asked to leave (e.g. terminal logout).
    ClientRequested,
    /// The peer closed the connection or the transport saw it die.
    ChannelInactive,
    /// Decode failure or handler fault on this connection.
    ServerExceptionOccurred,
    /// Another connection bound the same terminal id.
    SessionReplaced,
    /// No frame arrived within the idle timeout.
    IdleTimeout,
    /// The server is shutting down.
    ServerShutdown,
}

/// A terminal's binding to a connection.
#[derive(Debug, Clone)]
pub struct Session {
    pub session_id: SessionId,
    pub terminal_id: String,
    pub(crate) connection: Weak<ConnectionHandle>,
    pub created_at: DateTime<Utc>,
    pub last_bound_at: DateTime<Utc>,
    /// Set on the copy handed back when the session leaves the table.
    pub close_reason: Option<CloseReason>,
}

impl Session {
    pub(crate) fn new(terminal_id: &str, connection: &Arc<ConnectionHandle>) -> Self {
        let now = Utc::now();
        Self {
            session_id: SessionId::of(connection),
            terminal_id: terminal_id.to_string(),
            connection: Arc::downgrade(connection),
            created_at: now,
            last_bound_at: now,
            close_reason: None,
        }
    }

    /// The connection, if its event loop still holds it.
    pub fn connection(&self) -> Option<Arc<ConnectionHandle>> {
        self.connection.upgrade()
    }

    /// Queues an unescaped message on the bound connection.
    pub fn send(&self, message: Bytes) -> Result<(), Jt808Error> {
        self.connection()
            .ok_or(Jt808Error::ConnectionClosed)?
            .send(message)
    }
}

/// What `bind_if_absent` did.
#[derive(Debug, Clone)]
pub enum BindOutcome {
    /// No session existed for the terminal; one was created.
    Created,
    /// The terminal was already bound to this connection; only the timestamp moved.
    Refreshed,
    /// The terminal was bound to another connection, which lost the binding.
    Replaced { previous: Session },
}
