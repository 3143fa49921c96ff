// src/core/handler/request.rs

use crate::core::message_type::MessageType;
use crate::core::protocol::MessageHeader;
use bytes::Bytes;
use chrono::{DateTime, Utc};

/// One successfully parsed and classified inbound message.
///
/// Immutable once built; handlers only ever see it by reference.
#[derive(Debug, Clone)]
pub struct RequestMessage {
    header: MessageHeader,
    message_type: MessageType,
    body: Bytes,
    received_at: DateTime<Utc>,
}

impl RequestMessage {
    pub fn new(header: MessageHeader, message_type: MessageType, body: Bytes) -> Self {
        Self {
            header,
            message_type,
            body,
            received_at: Utc::now(),
        }
    }

    pub fn header(&self) -> &MessageHeader {
        &self.header
    }

    pub fn message_type(&self) -> &MessageType {
        &self.message_type
    }

    /// The raw, unescaped body. Never interpreted by the core.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }

    pub fn message_id(&self) -> u16 {
        self.header.message_id
    }

    pub fn terminal_id(&self) -> &str {
        &self.header.terminal_id
    }

    pub fn serial_number(&self) -> u16 {
        self.header.serial_number
    }
}
