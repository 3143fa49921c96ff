// src/core/state/mod.rs

//! Defines the central `ServerState` struct and the per-connection handle.

mod connection;
mod core;
mod stats;

pub use connection::{ConnectionChannels, ConnectionHandle, ConnectionPhase};
pub use core::ServerState;
pub use stats::StatsState;
