// src/core/protocol/frame.rs

//! Implements the delimiter-based frame splitter and the corresponding
//! `Encoder` for writing frames back to a terminal.

use super::escape::FRAME_DELIMITER;
use crate::core::Jt808Error;
use crate::core::errors::DecodeError;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::debug;

/// Default upper bound for the escaped content of a single frame.
pub const DEFAULT_MAX_FRAME_LENGTH: usize = 4096;

/// A `tokio_util::codec` implementation that splits the inbound byte stream on
/// `0x7E` and wraps outbound, already-escaped payloads in delimiters.
///
/// The decoder yields the still-escaped bytes between two delimiters. Back-to-back
/// delimiters (`7E 7E`, the usual boundary between two messages) produce an empty
/// frame which the caller is expected to ignore.
#[derive(Debug, Clone)]
pub struct Jt808FrameCodec {
    max_frame_length: usize,
}

impl Jt808FrameCodec {
    pub fn new(max_frame_length: usize) -> Self {
        Self { max_frame_length }
    }

    pub fn max_frame_length(&self) -> usize {
        self.max_frame_length
    }
}

impl Default for Jt808FrameCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_LENGTH)
    }
}

impl Decoder for Jt808FrameCodec {
    type Item = BytesMut;
    type Error = Jt808Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match src.iter().position(|&b| b == FRAME_DELIMITER) {
            Some(pos) if pos > self.max_frame_length => Err(DecodeError::FrameTooLong {
                max: self.max_frame_length,
            }
            .into()),
            Some(pos) => {
                let frame = src.split_to(pos);
                // Skip the delimiter itself.
                src.advance(1);
                Ok(Some(frame))
            }
            None if src.len() > self.max_frame_length => Err(DecodeError::FrameTooLong {
                max: self.max_frame_length,
            }
            .into()),
            None => Ok(None),
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(frame) = self.decode(src)? {
            return Ok(Some(frame));
        }
        if !src.is_empty() {
            debug!(
                "Discarding {} trailing bytes without a closing delimiter.",
                src.len()
            );
            src.clear();
        }
        Ok(None)
    }
}

impl Encoder<Bytes> for Jt808FrameCodec {
    type Error = Jt808Error;

    /// Writes `7E <payload> 7E`. The payload must already be escaped.
    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.reserve(item.len() + 2);
        dst.put_u8(FRAME_DELIMITER);
        dst.extend_from_slice(&item);
        dst.put_u8(FRAME_DELIMITER);
        Ok(())
    }
}
