// src/core/session/mod.rs

//! Terminal sessions and the registry that owns them.

mod manager;
mod record;

pub use manager::SessionManager;
pub use record::{BindOutcome, CloseReason, Session, SessionId};
