// src/core/protocol/checksum.rs

//! The one-byte XOR check code that trails every message.

use crate::core::errors::DecodeError;
use crate::core::protocol::header::MIN_HEADER_LEN;

/// Computes the check code: the XOR of every byte from the message id through
/// the end of the body.
pub fn check_code(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0, |acc, b| acc ^ b)
}

/// Splits the trailing check code off an unescaped message and returns the
/// header and body that precede it.
///
/// When `verify` is false the check code is dropped without being compared.
pub fn split_check_code(message: &[u8], verify: bool) -> Result<&[u8], DecodeError> {
    let Some((&expected, content)) = message.split_last() else {
        return Err(DecodeError::TruncatedHeader {
            expected: MIN_HEADER_LEN + 1,
            actual: 0,
        });
    };

    if verify {
        let actual = check_code(content);
        if actual != expected {
            return Err(DecodeError::CheckCodeMismatch { expected, actual });
        }
    }
    Ok(content)
}
