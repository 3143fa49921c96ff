// src/connection/mod.rs

//! Manages the lifecycle of a single terminal connection: framing, the
//! per-frame processing chain, and cleanup on every exit path.

mod guard;
mod handler;
mod processor;

pub use guard::ConnectionGuard;
pub use crate::core::state::ConnectionPhase;
pub use handler::ConnectionHandler;
pub use processor::{FrameOutcome, FrameProcessor};
