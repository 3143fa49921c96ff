// src/connection/processor.rs

//! Turns one delimiter-stripped frame into dispatched work.
//!
//! The chain is fixed: unescape, split and verify the check code, parse the
//! header, classify, bind the session, dispatch. An unknown message id is an
//! ordinary [`FrameOutcome::RecognitionGap`]; everything that goes wrong
//! further down is an `Err` the caller treats as fatal to the connection.

use crate::core::Jt808Error;
use crate::core::handler::{HandlerContext, RequestMessage};
use crate::core::metrics;
use crate::core::protocol::{checksum, escape, parse_header};
use crate::core::state::{ConnectionHandle, ServerState};
use bytes::{Bytes, BytesMut};
use std::sync::Arc;
use tracing::{debug, warn};

/// The non-fatal result of processing one frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Two adjacent delimiters; nothing to do.
    Empty,
    /// The message id is not registered. The frame was dropped.
    RecognitionGap { message_id: u16 },
    /// The message was dispatched. `responses` are escaped and ready to frame.
    Handled { responses: Vec<Bytes> },
}

pub struct FrameProcessor<'a> {
    state: &'a ServerState,
    connection: &'a Arc<ConnectionHandle>,
}

impl<'a> FrameProcessor<'a> {
    pub fn new(state: &'a ServerState, connection: &'a Arc<ConnectionHandle>) -> Self {
        Self { state, connection }
    }

    /// Processes one frame. The frame buffer is consumed and released on every path.
    pub async fn process(&self, frame: BytesMut) -> Result<FrameOutcome, Jt808Error> {
        if frame.is_empty() {
            return Ok(FrameOutcome::Empty);
        }
        self.state.stats.increment_total_frames();
        metrics::FRAMES_RECEIVED_TOTAL.inc();
        debug!(
            "Connection {} <- 7E{}7E",
            self.connection.id(),
            hex::encode_upper(&frame)
        );

        let unescaped = escape::unescape(&frame)?;
        drop(frame);
        let message =
            checksum::split_check_code(&unescaped, self.state.config.protocol.verify_check_code)?;
        let (header, body) = parse_header(message)?;

        let Some(message_type) = self.state.message_types.classify(header.message_id) else {
            warn!(
                "Dropping message 0x{:04X} from terminal {}: unknown message id.",
                header.message_id, header.terminal_id
            );
            self.state.stats.increment_dropped_frames();
            metrics::FRAMES_DROPPED_TOTAL.inc();
            return Ok(FrameOutcome::RecognitionGap {
                message_id: header.message_id,
            });
        };

        self.state
            .sessions
            .bind_if_absent(&header.terminal_id, self.connection);

        let body = Bytes::copy_from_slice(body);
        let request = RequestMessage::new(header, message_type, body);
        let ctx = HandlerContext::new(&self.state.sessions, self.connection);
        let responses = self.state.dispatcher.dispatch(&request, &ctx).await?;

        Ok(FrameOutcome::Handled {
            responses: responses
                .iter()
                .map(|response| escape::escape(response).freeze())
                .collect(),
        })
    }
}
