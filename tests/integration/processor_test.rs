// tests/integration/processor_test.rs

//! Runs single frames through `FrameProcessor` against a real server state.

use super::test_helpers::{TERMINAL_ID, TestContext, message, parse};
use anyhow::anyhow;
use bytes::{Bytes, BytesMut};
use jt808d::Jt808Error;
use jt808d::config::Config;
use jt808d::connection::{FrameOutcome, FrameProcessor};
use jt808d::core::DecodeError;
use jt808d::core::message_type::LOCATION_REPORT;
use jt808d::core::protocol::builder::PLATFORM_GENERAL_RESPONSE;
use jt808d::core::protocol::{ProtocolVersion, escape, unescape};
use std::sync::{Arc, Mutex};

fn frame(message: &[u8]) -> BytesMut {
    escape(message)
}

#[tokio::test]
async fn test_empty_frame_is_ignored() {
    let ctx = TestContext::new();
    let (conn, _rx) = ctx.connect();
    let outcome = FrameProcessor::new(&ctx.state, &conn)
        .process(BytesMut::new())
        .await
        .unwrap();
    assert_eq!(outcome, FrameOutcome::Empty);
    assert_eq!(ctx.state.stats.get_total_frames(), 0);
}

#[tokio::test]
async fn test_unknown_message_is_a_recognition_gap() {
    let ctx = TestContext::new();
    // A handler under an unregistered id must never run.
    let calls = Arc::new(Mutex::new(0));
    let counter = calls.clone();
    ctx.state.dispatcher.register_fn(
        &jt808d::core::MessageType::new(0x0F0F, "Unregistered"),
        move |_req, _ctx| {
            *counter.lock().unwrap() += 1;
            Ok(None)
        },
    );
    let (conn, _rx) = ctx.connect();

    let outcome = FrameProcessor::new(&ctx.state, &conn)
        .process(frame(&message(0x0F0F, 1, &[])))
        .await
        .unwrap();

    assert_eq!(outcome, FrameOutcome::RecognitionGap { message_id: 0x0F0F });
    assert_eq!(*calls.lock().unwrap(), 0);
    assert_eq!(ctx.state.sessions.count(), 0);
    assert_eq!(ctx.state.stats.get_dropped_frames(), 1);
    assert!(!conn.is_closed());
}

#[tokio::test]
async fn test_escaped_body_reaches_handler() {
    let ctx = TestContext::without_handlers();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let recorder = seen.clone();
    ctx.state
        .dispatcher
        .register_fn(&LOCATION_REPORT, move |req, hctx| {
            recorder.lock().unwrap().push((
                req.message_id(),
                req.terminal_id().to_string(),
                req.serial_number(),
                req.body().clone(),
                hctx.session().map(|s| s.terminal_id),
            ));
            Ok(None)
        });
    let (conn, _rx) = ctx.connect();

    let body = [0x30, 0x7E, 0x08, 0x7D, 0x55];
    let outcome = FrameProcessor::new(&ctx.state, &conn)
        .process(frame(&message(0x0200, 0x0123, &body)))
        .await
        .unwrap();

    assert_eq!(outcome, FrameOutcome::Handled { responses: vec![] });
    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    let (id, terminal, serial, received, session) = &seen[0];
    assert_eq!(*id, 0x0200);
    assert_eq!(terminal, TERMINAL_ID);
    assert_eq!(*serial, 0x0123);
    assert_eq!(&received[..], &body);
    assert_eq!(session.as_deref(), Some(TERMINAL_ID));

    let session = ctx.state.sessions.find_by_terminal_id(TERMINAL_ID).unwrap();
    assert_eq!(session.connection().unwrap().id(), conn.id());
}

#[tokio::test]
async fn test_2019_message_is_dispatched() {
    let ctx = TestContext::without_handlers();
    let versions = Arc::new(Mutex::new(Vec::new()));
    let recorder = versions.clone();
    ctx.state
        .dispatcher
        .register_fn(&LOCATION_REPORT, move |req, _ctx| {
            recorder.lock().unwrap().push(req.header().version);
            Ok(None)
        });
    let (conn, _rx) = ctx.connect();

    let message = jt808d::core::protocol::MessageBuilder::new(0x0200, "12345678901234567890", 7)
        .version(ProtocolVersion::V2019 {
            protocol_version: 1,
        })
        .body(vec![0x01])
        .build()
        .unwrap();
    FrameProcessor::new(&ctx.state, &conn)
        .process(frame(&message))
        .await
        .unwrap();

    assert_eq!(
        *versions.lock().unwrap(),
        vec![ProtocolVersion::V2019 {
            protocol_version: 1
        }]
    );
    assert!(
        ctx.state
            .sessions
            .find_by_terminal_id("12345678901234567890")
            .is_some()
    );
}

#[tokio::test]
async fn test_trailing_escape_marker_fails() {
    let ctx = TestContext::new();
    let (conn, _rx) = ctx.connect();
    let mut raw = frame(&message(0x0002, 1, &[]));
    raw.extend_from_slice(&[0x7D]);

    let err = FrameProcessor::new(&ctx.state, &conn)
        .process(raw)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Jt808Error::Decode(DecodeError::MalformedEscape { next: None, .. })
    ));
    assert_eq!(ctx.state.sessions.count(), 0);
}

#[tokio::test]
async fn test_check_code_mismatch() {
    let mut corrupted = message(0x0002, 1, &[]).to_vec();
    let last = corrupted.len() - 1;
    corrupted[last] ^= 0x01;

    let ctx = TestContext::new();
    let (conn, _rx) = ctx.connect();
    let err = FrameProcessor::new(&ctx.state, &conn)
        .process(frame(&corrupted))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Jt808Error::Decode(DecodeError::CheckCodeMismatch { .. })
    ));

    let mut config = Config::default();
    config.protocol.verify_check_code = false;
    let lenient = TestContext::with_config(config);
    let (conn, _rx) = lenient.connect();
    let outcome = FrameProcessor::new(&lenient.state, &conn)
        .process(frame(&corrupted))
        .await
        .unwrap();
    assert!(matches!(outcome, FrameOutcome::Handled { .. }));
}

#[tokio::test]
async fn test_body_length_mismatch() {
    let mut tampered = message(0x0002, 1, &[0x01, 0x02]).to_vec();
    // Drop one body byte and fix up the check code.
    tampered.remove(tampered.len() - 2);
    let last = tampered.len() - 1;
    tampered[last] = jt808d::core::protocol::checksum::check_code(&tampered[..last]);

    let ctx = TestContext::new();
    let (conn, _rx) = ctx.connect();
    let err = FrameProcessor::new(&ctx.state, &conn)
        .process(frame(&tampered))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        Jt808Error::Decode(DecodeError::BodyLengthMismatch {
            declared: 2,
            actual: 1
        })
    );
}

#[tokio::test]
async fn test_responses_are_escaped() {
    let ctx = TestContext::without_handlers();
    ctx.state
        .dispatcher
        .register_fn(&LOCATION_REPORT, |req, hctx| {
            hctx.reply(req, 0x8300, Bytes::from_static(&[0x7E, 0x7D]))
                .map(Some)
                .map_err(Into::into)
        });
    let (conn, _rx) = ctx.connect();

    let outcome = FrameProcessor::new(&ctx.state, &conn)
        .process(frame(&message(0x0200, 1, &[])))
        .await
        .unwrap();
    let FrameOutcome::Handled { responses } = outcome else {
        panic!("expected a handled frame");
    };
    assert_eq!(responses.len(), 1);
    assert!(!responses[0].contains(&0x7E));

    let (header, body) = parse(&unescape(&responses[0]).unwrap());
    assert_eq!(header.message_id, 0x8300);
    assert_eq!(body, vec![0x7E, 0x7D]);
}

#[tokio::test]
async fn test_heartbeat_gets_general_response() {
    let ctx = TestContext::new();
    let (conn, _rx) = ctx.connect();
    let outcome = FrameProcessor::new(&ctx.state, &conn)
        .process(frame(&message(0x0002, 0x0009, &[])))
        .await
        .unwrap();
    let FrameOutcome::Handled { responses } = outcome else {
        panic!("expected a handled frame");
    };
    let (header, body) = parse(&unescape(&responses[0]).unwrap());
    assert_eq!(header.message_id, PLATFORM_GENERAL_RESPONSE);
    assert_eq!(body, vec![0x00, 0x09, 0x00, 0x02, 0x00]);
}

#[tokio::test]
async fn test_handler_fault_is_an_error() {
    let ctx = TestContext::without_handlers();
    ctx.state
        .dispatcher
        .register_fn(&LOCATION_REPORT, |_req, _ctx| Err(anyhow!("storage offline")));
    let (conn, _rx) = ctx.connect();

    let err = FrameProcessor::new(&ctx.state, &conn)
        .process(frame(&message(0x0200, 1, &[])))
        .await
        .unwrap_err();
    assert!(matches!(err, Jt808Error::HandlerFault { message_id: 0x0200, .. }));
    // The session was bound before dispatch; the event loop removes it on close.
    assert_eq!(ctx.state.sessions.count(), 1);
}

#[tokio::test]
async fn test_heartbeat_from_f_padded_terminal() {
    let ctx = TestContext::new();
    let (conn, _rx) = ctx.connect();

    // Terminal id bytes 01 38 00 13 80 FF, as sent by terminals padding with F.
    let mut heartbeat = vec![0x00, 0x02, 0x00, 0x00, 0x01, 0x38, 0x00, 0x13, 0x80, 0xFF, 0x00, 0x07];
    heartbeat.push(jt808d::core::protocol::checksum::check_code(&heartbeat));

    let outcome = FrameProcessor::new(&ctx.state, &conn)
        .process(frame(&heartbeat))
        .await
        .unwrap();
    let FrameOutcome::Handled { responses } = outcome else {
        panic!("expected a handled frame, got {outcome:?}");
    };
    assert_eq!(responses.len(), 1);

    let response = unescape(&responses[0]).unwrap();
    assert_eq!(&response[4..10], &heartbeat[4..10]);
    let (header, body) = parse(&response);
    assert_eq!(header.message_id, PLATFORM_GENERAL_RESPONSE);
    assert_eq!(header.terminal_id, "138001380FF");
    assert_eq!(body, vec![0x00, 0x07, 0x00, 0x02, 0x00]);
    assert!(!conn.is_closed());
    assert!(ctx.state.sessions.find_by_terminal_id("138001380FF").is_some());
}
