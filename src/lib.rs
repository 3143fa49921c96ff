// src/lib.rs

pub mod config;
pub mod connection;
pub mod core;
pub mod server;

// Re-export
pub use crate::core::{Jt808Error, protocol};
pub use crate::core::handler::{HandlerContext, MessageHandler, RequestMessage};
pub use crate::core::state::ServerState;
