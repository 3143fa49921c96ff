// src/core/protocol/builder.rs

//! Builds unescaped platform-to-terminal messages.

use super::bcd;
use super::checksum::check_code;
use super::header::{MAX_BODY_LEN, MessageProperties, ProtocolVersion};
use crate::core::Jt808Error;
use bytes::{BufMut, Bytes, BytesMut};

/// Platform general response.
pub const PLATFORM_GENERAL_RESPONSE: u16 = 0x8001;

/// Result code carried by a platform general response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum GeneralResult {
    Success = 0,
    Failure = 1,
    MessageError = 2,
    Unsupported = 3,
    AlarmConfirmed = 4,
}

/// Assembles header, body and check code for an outbound message.
///
/// The output is not escaped; the connection escapes it before writing.
#[derive(Debug, Clone)]
pub struct MessageBuilder {
    message_id: u16,
    terminal_id: String,
    serial_number: u16,
    version: ProtocolVersion,
    body: Bytes,
}

impl MessageBuilder {
    pub fn new(message_id: u16, terminal_id: impl Into<String>, serial_number: u16) -> Self {
        Self {
            message_id,
            terminal_id: terminal_id.into(),
            serial_number,
            version: ProtocolVersion::V2013,
            body: Bytes::new(),
        }
    }

    pub fn version(mut self, version: ProtocolVersion) -> Self {
        self.version = version;
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn build(self) -> Result<Bytes, Jt808Error> {
        if self.body.len() > MAX_BODY_LEN {
            return Err(Jt808Error::InvalidRequest(format!(
                "body of {} bytes exceeds the {MAX_BODY_LEN} byte limit",
                self.body.len()
            )));
        }
        let terminal_id = bcd::encode_terminal_id(&self.terminal_id, self.version.terminal_id_len())?;
        let properties = MessageProperties::new(self.body.len() as u16, self.version, false);

        let mut dst = BytesMut::with_capacity(terminal_id.len() + self.body.len() + 8);
        dst.put_u16(self.message_id);
        dst.put_u16(properties.to_raw());
        if let ProtocolVersion::V2019 { protocol_version } = self.version {
            dst.put_u8(protocol_version);
        }
        dst.put_slice(&terminal_id);
        dst.put_u16(self.serial_number);
        dst.put_slice(&self.body);
        let code = check_code(&dst);
        dst.put_u8(code);
        Ok(dst.freeze())
    }
}

/// Body of a platform general response (0x8001).
pub fn general_response_body(reply_serial: u16, reply_message_id: u16, result: GeneralResult) -> Bytes {
    let mut body = BytesMut::with_capacity(5);
    body.put_u16(reply_serial);
    body.put_u16(reply_message_id);
    body.put_u8(result as u8);
    body.freeze()
}
