// src/core/mod.rs

//! The central module containing the protocol, session and dispatch logic of the gateway.

pub mod errors;
pub mod handler;
pub mod message_type;
pub mod metrics;
pub mod protocol;
pub mod session;
pub mod state;

pub use errors::{DecodeError, Jt808Error};
pub use handler::{HandlerContext, MessageHandler, RequestMessage};
pub use message_type::{MessageType, MessageTypeRegistry};
