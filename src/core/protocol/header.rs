// src/core/protocol/header.rs

//! Parses the JT/T 808 message header out of an unescaped buffer.
//!
//! Layout (all integers big-endian):
//!
//! ```text
//! 2013: msg id (2) | properties (2) | terminal id BCD[6]  | serial (2) | [total (2) | index (2)]
//! 2019: msg id (2) | properties (2) | version (1) | terminal id BCD[10] | serial (2) | [total (2) | index (2)]
//! ```
//!
//! The properties word carries the body length in bits 0-9, the encryption
//! type in bits 10-12, the sub-package flag in bit 13 and the 2019 version
//! identifier in bit 14. The body must be exactly as long as declared.

use super::bcd;
use crate::core::errors::DecodeError;
use bitflags::bitflags;
use bytes::Buf;
use std::fmt;

/// Smallest possible header: the 2013 layout without a sub-package block.
pub const MIN_HEADER_LEN: usize = 12;
/// Header length of the 2019 layout without a sub-package block.
pub const MIN_HEADER_LEN_2019: usize = 17;
/// Size of the optional sub-package block.
pub const SUB_PACKAGE_LEN: usize = 4;
/// Largest body the 10-bit length field can describe.
pub const MAX_BODY_LEN: usize = 0x03FF;

const TERMINAL_ID_LEN_2013: usize = 6;
const TERMINAL_ID_LEN_2019: usize = 10;
const BODY_LENGTH_MASK: u16 = 0x03FF;
const ENCRYPTION_MASK: u16 = 0x1C00;
const ENCRYPTION_SHIFT: u16 = 10;

bitflags! {
    /// The single-bit flags of the properties word.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PropertyFlags: u16 {
        /// The message is one package of a larger, split message.
        const SUB_PACKAGE        = 1 << 13;
        /// The header uses the 2019 layout.
        const VERSION_IDENTIFIER = 1 << 14;
        const RESERVED           = 1 << 15;
    }
}

/// Body encryption announced by the header. The body is never decrypted here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EncryptionType {
    None,
    Rsa,
    /// Any other value of the three encryption bits.
    Other(u8),
}

impl EncryptionType {
    fn from_bits(bits: u8) -> Self {
        match bits {
            0b000 => EncryptionType::None,
            0b001 => EncryptionType::Rsa,
            other => EncryptionType::Other(other),
        }
    }

    fn bits(self) -> u8 {
        match self {
            EncryptionType::None => 0b000,
            EncryptionType::Rsa => 0b001,
            EncryptionType::Other(bits) => bits & 0b111,
        }
    }
}

/// The decoded properties word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageProperties {
    pub body_length: u16,
    pub encryption: EncryptionType,
    pub flags: PropertyFlags,
}

impl MessageProperties {
    /// Builds properties for an unencrypted message with the given body length.
    pub fn new(body_length: u16, version: ProtocolVersion, sub_packaged: bool) -> Self {
        let mut flags = PropertyFlags::empty();
        flags.set(PropertyFlags::SUB_PACKAGE, sub_packaged);
        flags.set(
            PropertyFlags::VERSION_IDENTIFIER,
            matches!(version, ProtocolVersion::V2019 { .. }),
        );
        Self {
            body_length: body_length & BODY_LENGTH_MASK,
            encryption: EncryptionType::None,
            flags,
        }
    }

    pub fn from_raw(raw: u16) -> Self {
        Self {
            body_length: raw & BODY_LENGTH_MASK,
            encryption: EncryptionType::from_bits(((raw & ENCRYPTION_MASK) >> ENCRYPTION_SHIFT) as u8),
            flags: PropertyFlags::from_bits_truncate(raw),
        }
    }

    pub fn to_raw(self) -> u16 {
        (self.body_length & BODY_LENGTH_MASK)
            | ((self.encryption.bits() as u16) << ENCRYPTION_SHIFT)
            | self.flags.bits()
    }

    pub fn is_sub_packaged(&self) -> bool {
        self.flags.contains(PropertyFlags::SUB_PACKAGE)
    }

    pub fn is_version_2019(&self) -> bool {
        self.flags.contains(PropertyFlags::VERSION_IDENTIFIER)
    }
}

/// Which header layout a message uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtocolVersion {
    V2013,
    /// The 2019 layout carries an explicit protocol version byte.
    V2019 { protocol_version: u8 },
}

impl ProtocolVersion {
    /// Width of the BCD terminal id field for this layout.
    pub fn terminal_id_len(self) -> usize {
        match self {
            ProtocolVersion::V2013 => TERMINAL_ID_LEN_2013,
            ProtocolVersion::V2019 { .. } => TERMINAL_ID_LEN_2019,
        }
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolVersion::V2013 => write!(f, "2013"),
            ProtocolVersion::V2019 { protocol_version } => write!(f, "2019(v{protocol_version})"),
        }
    }
}

/// Position of one package within a split message. Both values are 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubPackage {
    pub total_packages: u16,
    pub package_index: u16,
}

/// A parsed message header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageHeader {
    pub message_id: u16,
    pub properties: MessageProperties,
    pub version: ProtocolVersion,
    /// BCD-decoded with leading zero padding removed.
    pub terminal_id: String,
    pub serial_number: u16,
    pub sub_package: Option<SubPackage>,
}

impl MessageHeader {
    /// Number of bytes this header occupies on the wire.
    pub fn encoded_len(&self) -> usize {
        let base = match self.version {
            ProtocolVersion::V2013 => MIN_HEADER_LEN,
            ProtocolVersion::V2019 { .. } => MIN_HEADER_LEN_2019,
        };
        if self.sub_package.is_some() {
            base + SUB_PACKAGE_LEN
        } else {
            base
        }
    }
}

/// Parses the header at the start of `src` and returns it with the remaining body.
///
/// `src` must hold exactly one unescaped message without its check code.
pub fn parse_header(src: &[u8]) -> Result<(MessageHeader, &[u8]), DecodeError> {
    ensure_len(src, MIN_HEADER_LEN)?;

    let mut buf = src;
    let message_id = buf.get_u16();
    let properties = MessageProperties::from_raw(buf.get_u16());

    let version = if properties.is_version_2019() {
        ensure_len(src, MIN_HEADER_LEN_2019)?;
        ProtocolVersion::V2019 {
            protocol_version: buf.get_u8(),
        }
    } else {
        ProtocolVersion::V2013
    };

    let (terminal_bytes, rest) = buf.split_at(version.terminal_id_len());
    let terminal_id = bcd::decode_terminal_id(terminal_bytes);
    buf = rest;
    let serial_number = buf.get_u16();

    let sub_package = if properties.is_sub_packaged() {
        let consumed = src.len() - buf.len();
        ensure_len(src, consumed + SUB_PACKAGE_LEN)?;
        let total_packages = buf.get_u16();
        let package_index = buf.get_u16();
        if total_packages == 0 || package_index == 0 || package_index > total_packages {
            return Err(DecodeError::InvalidSubPackage {
                total: total_packages,
                index: package_index,
            });
        }
        Some(SubPackage {
            total_packages,
            package_index,
        })
    } else {
        None
    };

    let declared = properties.body_length as usize;
    if buf.len() != declared {
        return Err(DecodeError::BodyLengthMismatch {
            declared,
            actual: buf.len(),
        });
    }

    let header = MessageHeader {
        message_id,
        properties,
        version,
        terminal_id,
        serial_number,
        sub_package,
    };
    Ok((header, buf))
}

fn ensure_len(src: &[u8], expected: usize) -> Result<(), DecodeError> {
    if src.len() < expected {
        return Err(DecodeError::TruncatedHeader {
            expected,
            actual: src.len(),
        });
    }
    Ok(())
}
