// src/core/handler/mod.rs

//! The boundary between the core and business message handlers.
//!
//! A handler implements [`MessageHandler`] and is registered with the
//! [`MessageDispatcher`] for one message type. It receives the parsed
//! [`RequestMessage`] and a [`HandlerContext`] giving access to the bound
//! session, and may return one unescaped response message.

pub mod builtin;
pub mod dispatcher;
mod request;

pub use dispatcher::MessageDispatcher;
pub use request::RequestMessage;

use crate::core::Jt808Error;
use crate::core::protocol::builder::{
    GeneralResult, MessageBuilder, PLATFORM_GENERAL_RESPONSE, general_response_body,
};
use crate::core::session::{CloseReason, Session, SessionId, SessionManager};
use crate::core::state::ConnectionHandle;
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;

/// What a handler returns: an optional unescaped response, or a fault.
pub type HandlerResult = anyhow::Result<Option<Bytes>>;

/// A business handler for one message type.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, request: &RequestMessage, ctx: &HandlerContext<'_>) -> HandlerResult;
}

#[async_trait]
impl<F> MessageHandler for F
where
    F: Fn(&RequestMessage, &HandlerContext<'_>) -> HandlerResult + Send + Sync,
{
    async fn handle(&self, request: &RequestMessage, ctx: &HandlerContext<'_>) -> HandlerResult {
        self(request, ctx)
    }
}

/// Per-dispatch access to the session registry and the calling connection.
pub struct HandlerContext<'a> {
    sessions: &'a SessionManager,
    connection: &'a Arc<ConnectionHandle>,
}

impl<'a> HandlerContext<'a> {
    pub fn new(sessions: &'a SessionManager, connection: &'a Arc<ConnectionHandle>) -> Self {
        Self {
            sessions,
            connection,
        }
    }

    pub fn session_id(&self) -> SessionId {
        self.sessions.session_id_for(self.connection)
    }

    /// The session currently bound to this connection, if any.
    pub fn session(&self) -> Option<Session> {
        self.sessions.find_by_session_id(self.session_id())
    }

    pub fn sessions(&self) -> &SessionManager {
        self.sessions
    }

    pub fn connection(&self) -> &Arc<ConnectionHandle> {
        self.connection
    }

    /// Builds a message to the requesting terminal, using this connection's
    /// serial counter and the request's header layout.
    pub fn reply(
        &self,
        request: &RequestMessage,
        message_id: u16,
        body: impl Into<Bytes>,
    ) -> Result<Bytes, Jt808Error> {
        MessageBuilder::new(
            message_id,
            request.terminal_id(),
            self.connection.next_serial(),
        )
        .version(request.header().version)
        .body(body)
        .build()
    }

    /// Builds a platform general response (0x8001) acknowledging `request`.
    pub fn general_response(
        &self,
        request: &RequestMessage,
        result: GeneralResult,
    ) -> Result<Bytes, Jt808Error> {
        let body = general_response_body(request.serial_number(), request.message_id(), result);
        self.reply(request, PLATFORM_GENERAL_RESPONSE, body)
    }

    /// Removes this connection's session and closes the connection once the
    /// current dispatch has finished writing its responses.
    pub fn close_connection(&self, reason: CloseReason) {
        self.sessions.remove_and_close(self.session_id(), reason);
        // Only takes effect when no session was bound; `close` is idempotent.
        self.connection.close(reason);
    }
}
