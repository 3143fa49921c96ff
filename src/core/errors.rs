// src/core/errors.rs

//! Defines the primary error types for the gateway.
//!
//! Wire-level failures live in [`DecodeError`]; everything that can end a
//! connection is folded into [`Jt808Error`]. An unknown message id is never an
//! error value, see `connection::FrameOutcome::RecognitionGap`.

use crate::core::session::CloseReason;
use std::sync::Arc;
use thiserror::Error;

/// Failures while turning an inbound frame into a header and body.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// `0x7D` followed by something other than `0x01`/`0x02`, or by nothing.
    #[error("malformed escape sequence at offset {offset}: 0x7D followed by {}", fmt_next(.next))]
    MalformedEscape { offset: usize, next: Option<u8> },

    #[error("truncated header: expected at least {expected} bytes, got {actual}")]
    TruncatedHeader { expected: usize, actual: usize },

    #[error("body length mismatch: header declares {declared} bytes but {actual} remain")]
    BodyLengthMismatch { declared: usize, actual: usize },

    #[error("invalid sub-package fields: package {index} of {total}")]
    InvalidSubPackage { total: u16, index: u16 },

    #[error("check code mismatch: frame carries 0x{expected:02X}, computed 0x{actual:02X}")]
    CheckCodeMismatch { expected: u8, actual: u8 },

    #[error("frame exceeds the maximum length of {max} bytes")]
    FrameTooLong { max: usize },
}

fn fmt_next(next: &Option<u8>) -> String {
    match next {
        Some(b) => format!("0x{b:02X}"),
        None => "end of frame".to_string(),
    }
}

/// The main error enum, representing every failure that can surface from the
/// processing chain or the session registry.
#[derive(Error, Debug, Clone)]
pub enum Jt808Error {
    #[error("IO Error: {0}")]
    Io(Arc<std::io::Error>),

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// A business handler returned an error or panicked.
    #[error("Handler fault for message 0x{message_id:04X}: {reason}")]
    HandlerFault { message_id: u16, reason: String },

    #[error("Message type 0x{0:04X} is already registered")]
    DuplicateMessageType(u16),

    #[error("No live session for terminal '{0}'")]
    TerminalNotFound(String),

    #[error("Connection is closed")]
    ConnectionClosed,

    #[error("Outbound queue is full")]
    OutboundQueueFull,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Internal Server Error: {0}")]
    Internal(String),
}

impl Jt808Error {
    /// Returns true for I/O errors that only mean the peer went away.
    pub fn is_normal_disconnect(&self) -> bool {
        matches!(self, Jt808Error::Io(arc_err) if matches!(
            arc_err.kind(),
            std::io::ErrorKind::ConnectionReset
                | std::io::ErrorKind::BrokenPipe
                | std::io::ErrorKind::UnexpectedEof
                | std::io::ErrorKind::ConnectionAborted
        ))
    }

    /// The reason recorded on the session when this error ends a connection.
    pub fn close_reason(&self) -> CloseReason {
        if self.is_normal_disconnect() {
            CloseReason::ChannelInactive
        } else {
            CloseReason::ServerExceptionOccurred
        }
    }
}

impl PartialEq for Jt808Error {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Jt808Error::Io(e1), Jt808Error::Io(e2)) => e1.to_string() == e2.to_string(),
            (Jt808Error::Decode(d1), Jt808Error::Decode(d2)) => d1 == d2,
            (
                Jt808Error::HandlerFault {
                    message_id: m1,
                    reason: r1,
                },
                Jt808Error::HandlerFault {
                    message_id: m2,
                    reason: r2,
                },
            ) => m1 == m2 && r1 == r2,
            (Jt808Error::DuplicateMessageType(a), Jt808Error::DuplicateMessageType(b)) => a == b,
            (Jt808Error::TerminalNotFound(a), Jt808Error::TerminalNotFound(b)) => a == b,
            (Jt808Error::InvalidRequest(a), Jt808Error::InvalidRequest(b)) => a == b,
            (Jt808Error::Internal(a), Jt808Error::Internal(b)) => a == b,
            _ => core::mem::discriminant(self) == core::mem::discriminant(other),
        }
    }
}

// --- From trait implementations for easy error conversion ---

impl From<std::io::Error> for Jt808Error {
    fn from(e: std::io::Error) -> Self {
        Jt808Error::Io(Arc::new(e))
    }
}
