// src/core/protocol/bcd.rs

//! Packed BCD helpers for terminal identifiers.

use crate::core::Jt808Error;

/// Expands packed BCD into one character per nibble.
///
/// Nibbles above 9 are rendered as upper-case hex rather than rejected; some
/// terminals pad with `F`.
pub fn decode(bytes: &[u8]) -> String {
    hex::encode_upper(bytes)
}

/// Decodes a BCD terminal id and strips leading zero padding.
///
/// An id made entirely of zeros normalizes to `"0"`.
pub fn decode_terminal_id(bytes: &[u8]) -> String {
    let digits = decode(bytes);
    let trimmed = digits.trim_start_matches('0');
    if trimmed.is_empty() {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Packs a terminal id into `width` bytes of BCD, left-padding with zeros.
///
/// Accepts the same alphabet [`decode`] produces: decimal digits plus the
/// upper-case nibbles `A`-`F`, so ids of `F`-padded terminals can be echoed back.
pub fn encode_terminal_id(terminal_id: &str, width: usize) -> Result<Vec<u8>, Jt808Error> {
    if terminal_id.is_empty()
        || !terminal_id
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'A'..=b'F').contains(&b))
    {
        return Err(Jt808Error::InvalidRequest(format!(
            "terminal id '{terminal_id}' is not a BCD digit string"
        )));
    }
    let max_digits = width * 2;
    if terminal_id.len() > max_digits {
        return Err(Jt808Error::InvalidRequest(format!(
            "terminal id '{terminal_id}' does not fit in {width} BCD bytes"
        )));
    }

    let padded = format!("{terminal_id:0>max_digits$}");
    hex::decode(&padded).map_err(|e| {
        Jt808Error::InvalidRequest(format!("terminal id '{terminal_id}' is not BCD: {e}"))
    })
}
