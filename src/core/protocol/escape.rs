// src/core/protocol/escape.rs

//! The JT/T 808 byte-stuffing scheme.
//!
//! `0x7E` delimits frames on the wire, so it may never appear inside one. The
//! sender replaces `0x7E` with `0x7D 0x02` and the escape marker `0x7D` itself
//! with `0x7D 0x01`. The receiver reverses both substitutions.

use crate::core::errors::DecodeError;
use bytes::{BufMut, BytesMut};

/// The byte that starts and ends every frame on the wire.
pub const FRAME_DELIMITER: u8 = 0x7E;
/// The byte that introduces a two-byte escape sequence.
pub const ESCAPE_MARKER: u8 = 0x7D;

const ESCAPED_MARKER: u8 = 0x01;
const ESCAPED_DELIMITER: u8 = 0x02;

/// Reverses the escaping applied by the sender.
///
/// Decoding runs left to right. An escape marker that is followed by anything
/// other than `0x01` or `0x02`, or that ends the input, fails with
/// [`DecodeError::MalformedEscape`].
pub fn unescape(src: &[u8]) -> Result<BytesMut, DecodeError> {
    let mut dst = BytesMut::with_capacity(src.len());
    let mut bytes = src.iter().copied().enumerate();

    while let Some((offset, byte)) = bytes.next() {
        if byte != ESCAPE_MARKER {
            dst.put_u8(byte);
            continue;
        }
        match bytes.next() {
            Some((_, ESCAPED_MARKER)) => dst.put_u8(ESCAPE_MARKER),
            Some((_, ESCAPED_DELIMITER)) => dst.put_u8(FRAME_DELIMITER),
            Some((_, other)) => {
                return Err(DecodeError::MalformedEscape {
                    offset,
                    next: Some(other),
                });
            }
            None => return Err(DecodeError::MalformedEscape { offset, next: None }),
        }
    }
    Ok(dst)
}

/// Escapes a message so it can be placed between two frame delimiters.
///
/// The output never contains a raw `0x7E`.
pub fn escape(src: &[u8]) -> BytesMut {
    let extra = src
        .iter()
        .filter(|&&b| b == FRAME_DELIMITER || b == ESCAPE_MARKER)
        .count();
    let mut dst = BytesMut::with_capacity(src.len() + extra);

    for &byte in src {
        match byte {
            FRAME_DELIMITER => dst.put_slice(&[ESCAPE_MARKER, ESCAPED_DELIMITER]),
            ESCAPE_MARKER => dst.put_slice(&[ESCAPE_MARKER, ESCAPED_MARKER]),
            _ => dst.put_u8(byte),
        }
    }
    dst
}
