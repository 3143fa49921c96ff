// tests/integration/connection_test.rs

//! Drives the connection event loop over an in-memory stream.

use super::test_helpers::{TERMINAL_ID, TestConnection, TestContext, message, parse};
use anyhow::anyhow;
use bytes::Bytes;
use jt808d::Jt808Error;
use jt808d::config::Config;
use jt808d::connection::{ConnectionHandler, ConnectionPhase};
use jt808d::core::message_type::LOCATION_REPORT;
use jt808d::core::protocol::builder::PLATFORM_GENERAL_RESPONSE;
use jt808d::core::session::CloseReason;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;

#[tokio::test]
async fn test_heartbeat_round_trip() {
    let ctx = TestContext::new();
    let mut conn = ctx.spawn_connection();

    conn.send_message(&message(0x0002, 0x0010, &[])).await;
    let response = conn.read_message().await.expect("a response");
    let (header, body) = parse(&response);
    assert_eq!(header.message_id, PLATFORM_GENERAL_RESPONSE);
    assert_eq!(header.terminal_id, TERMINAL_ID);
    assert_eq!(body, vec![0x00, 0x10, 0x00, 0x02, 0x00]);

    let session = ctx.state.sessions.find_by_terminal_id(TERMINAL_ID).unwrap();
    assert_eq!(session.connection().unwrap().id(), conn.connection.id());

    // Dropping the terminal side is a peer disconnect.
    let TestConnection { client, connection, task, .. } = conn;
    drop(client);
    let reason = tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reason, Ok(CloseReason::ChannelInactive));
    assert_eq!(connection.close_reason(), Some(CloseReason::ChannelInactive));
    assert_eq!(ctx.state.sessions.count(), 0);
    assert_eq!(ctx.state.connection_count(), 0);
}

#[tokio::test]
async fn test_handler_fault_closes_connection() {
    let ctx = TestContext::new();
    ctx.state
        .dispatcher
        .register_fn(&LOCATION_REPORT, |_req, _ctx| Err(anyhow!("boom")));
    let mut conn = ctx.spawn_connection();

    conn.send_message(&message(0x0200, 1, &[0x01])).await;
    // No partial response: the stream simply ends.
    assert!(conn.read_message().await.is_none());

    let connection = conn.connection.clone();
    let result = conn.finish().await;
    assert!(matches!(result, Err(Jt808Error::HandlerFault { message_id: 0x0200, .. })));
    assert_eq!(
        connection.close_reason(),
        Some(CloseReason::ServerExceptionOccurred)
    );
    assert_eq!(ctx.state.sessions.count(), 0);
    assert_eq!(ctx.state.connection_count(), 0);
    assert_eq!(ctx.state.stats.get_faulted_connections(), 1);
}

#[tokio::test]
async fn test_decode_error_closes_connection() {
    let ctx = TestContext::new();
    let mut conn = ctx.spawn_connection();

    // Escape marker followed by a byte other than 0x01 or 0x02.
    conn.send_raw(&[0x00, 0x02, 0x7D, 0x05]).await;
    assert!(conn.read_message().await.is_none());

    let connection = conn.connection.clone();
    assert!(matches!(conn.finish().await, Err(Jt808Error::Decode(_))));
    assert_eq!(
        connection.close_reason(),
        Some(CloseReason::ServerExceptionOccurred)
    );
}

#[tokio::test]
async fn test_unknown_message_keeps_connection_open() {
    let ctx = TestContext::new();
    let mut conn = ctx.spawn_connection();

    conn.send_message(&message(0x0F0F, 1, &[])).await;
    conn.send_message(&message(0x0002, 2, &[])).await;

    let (header, body) = parse(&conn.read_message().await.unwrap());
    assert_eq!(header.message_id, PLATFORM_GENERAL_RESPONSE);
    assert_eq!(&body[..2], &[0x00, 0x02]);
    assert!(!conn.connection.is_closed());
    assert_eq!(ctx.state.stats.get_dropped_frames(), 1);
}

#[tokio::test]
async fn test_logout_acknowledges_then_closes() {
    let ctx = TestContext::new();
    let mut conn = ctx.spawn_connection();

    conn.send_message(&message(0x0003, 5, &[])).await;
    let (header, body) = parse(&conn.read_message().await.unwrap());
    assert_eq!(header.message_id, PLATFORM_GENERAL_RESPONSE);
    assert_eq!(body, vec![0x00, 0x05, 0x00, 0x03, 0x00]);
    assert!(conn.read_message().await.is_none());

    assert_eq!(conn.finish().await, Ok(CloseReason::ClientRequested));
    assert_eq!(ctx.state.sessions.count(), 0);
}

#[tokio::test]
async fn test_superseded_connection_stays_open() {
    let ctx = TestContext::new();
    let mut first = ctx.spawn_connection();
    let mut second = ctx.spawn_connection();

    first.send_message(&message(0x0002, 1, &[])).await;
    first.read_message().await.unwrap();
    second.send_message(&message(0x0002, 1, &[])).await;
    second.read_message().await.unwrap();

    let session = ctx.state.sessions.find_by_terminal_id(TERMINAL_ID).unwrap();
    assert_eq!(session.connection().unwrap().id(), second.connection.id());
    assert!(!first.connection.is_closed());

    // Its inactivity must not remove the new binding.
    drop(first.client);
    let closed = tokio::time::timeout(Duration::from_secs(5), first.task)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(closed, Ok(CloseReason::ChannelInactive));
    assert_eq!(ctx.state.sessions.count(), 1);
    let session = ctx.state.sessions.find_by_terminal_id(TERMINAL_ID).unwrap();
    assert_eq!(session.connection().unwrap().id(), second.connection.id());
}

#[tokio::test]
async fn test_close_superseded_connection() {
    let mut config = Config::default();
    config.session.close_superseded = true;
    let ctx = TestContext::with_config(config);
    let mut first = ctx.spawn_connection();
    let mut second = ctx.spawn_connection();

    first.send_message(&message(0x0002, 1, &[])).await;
    first.read_message().await.unwrap();
    second.send_message(&message(0x0002, 1, &[])).await;
    second.read_message().await.unwrap();

    assert_eq!(first.finish().await, Ok(CloseReason::SessionReplaced));
    assert!(!second.connection.is_closed());
    assert_eq!(ctx.state.sessions.count(), 1);
}

#[tokio::test]
async fn test_downlink_message_reaches_terminal() {
    let ctx = TestContext::new();
    let mut conn = ctx.spawn_connection();
    conn.send_message(&message(0x0002, 1, &[])).await;
    conn.read_message().await.unwrap();

    let downlink = jt808d::core::protocol::MessageBuilder::new(0x8300, TERMINAL_ID, 0)
        .body(Bytes::from_static(&[0x00, 0x7E]))
        .build()
        .unwrap();
    ctx.state
        .sessions
        .send_to_terminal(TERMINAL_ID, downlink.clone())
        .unwrap();

    let received = conn.read_message().await.unwrap();
    assert_eq!(&received[..], &downlink[..]);
    assert_eq!(
        ctx.state.sessions.send_to_terminal("999", downlink),
        Err(Jt808Error::TerminalNotFound("999".to_string()))
    );
}

#[tokio::test]
async fn test_idle_connection_times_out() {
    let mut config = Config::default();
    config.session.idle_timeout = Duration::from_millis(100);
    let ctx = TestContext::with_config(config);
    let mut conn = ctx.spawn_connection();
    conn.send_message(&message(0x0002, 1, &[])).await;
    conn.read_message().await.unwrap();

    assert_eq!(conn.finish().await, Ok(CloseReason::IdleTimeout));
    assert_eq!(ctx.state.sessions.count(), 0);
}

#[tokio::test]
async fn test_shutdown_closes_connection() {
    let ctx = TestContext::new();
    let conn = ctx.spawn_connection();
    conn.shutdown_tx.send(()).unwrap();
    assert_eq!(conn.finish().await, Ok(CloseReason::ServerShutdown));
    assert_eq!(ctx.state.connection_count(), 0);
}

#[tokio::test]
async fn test_phase_is_visible_through_handle() {
    let ctx = TestContext::new();
    let observed = Arc::new(Mutex::new(Vec::new()));
    let recorder = observed.clone();
    ctx.state
        .dispatcher
        .register_fn(&LOCATION_REPORT, move |_req, hctx| {
            recorder.lock().unwrap().push(hctx.connection().phase());
            Ok(None)
        });

    let (_client, server) = tokio::io::duplex(64);
    let (connection, channels) = ctx.connect();
    let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let handler = ConnectionHandler::new(server, ctx.state.clone(), connection.clone(), channels, shutdown_rx);
    assert_eq!(connection.phase(), ConnectionPhase::Open);
    drop(handler);

    let mut conn = ctx.spawn_connection();
    assert_eq!(conn.connection.phase(), ConnectionPhase::Open);
    conn.send_message(&message(0x0200, 1, &[])).await;
    conn.send_message(&message(0x0002, 2, &[])).await;
    conn.read_message().await.unwrap();
    assert_eq!(*observed.lock().unwrap(), vec![ConnectionPhase::Processing]);

    let connection = conn.connection.clone();
    conn.shutdown_tx.send(()).unwrap();
    assert_eq!(conn.finish().await, Ok(CloseReason::ServerShutdown));
    assert_eq!(connection.phase(), ConnectionPhase::Closed);
}
