// src/core/handler/builtin.rs

//! Protocol-level handlers every gateway needs. Business messages are left to
//! handlers registered by the embedding application.

use super::{HandlerContext, HandlerResult, MessageDispatcher, MessageHandler, RequestMessage};
use crate::core::message_type::{TERMINAL_HEARTBEAT, TERMINAL_LOGOUT};
use crate::core::protocol::GeneralResult;
use crate::core::session::CloseReason;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

/// Acknowledges a terminal heartbeat (0x0002) with a general response.
#[derive(Debug, Default)]
pub struct HeartbeatHandler;

#[async_trait]
impl MessageHandler for HeartbeatHandler {
    async fn handle(&self, request: &RequestMessage, ctx: &HandlerContext<'_>) -> HandlerResult {
        Ok(Some(ctx.general_response(request, GeneralResult::Success)?))
    }
}

/// Acknowledges a terminal logout (0x0003), then closes the connection.
#[derive(Debug, Default)]
pub struct TerminalLogoutHandler;

#[async_trait]
impl MessageHandler for TerminalLogoutHandler {
    async fn handle(&self, request: &RequestMessage, ctx: &HandlerContext<'_>) -> HandlerResult {
        let response = ctx.general_response(request, GeneralResult::Success)?;
        info!("Terminal {} logged out.", request.terminal_id());
        ctx.close_connection(CloseReason::ClientRequested);
        Ok(Some(response))
    }
}

pub fn register_builtin_handlers(dispatcher: &MessageDispatcher) {
    dispatcher.register(&TERMINAL_HEARTBEAT, Arc::new(HeartbeatHandler));
    dispatcher.register(&TERMINAL_LOGOUT, Arc::new(TerminalLogoutHandler));
}
