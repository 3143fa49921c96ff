// tests/integration/test_helpers.rs

//! Test helpers and utilities for integration tests

use bytes::{Bytes, BytesMut};
use futures::{SinkExt, StreamExt};
use jt808d::Jt808Error;
use jt808d::config::Config;
use jt808d::connection::ConnectionHandler;
use jt808d::core::protocol::checksum::split_check_code;
use jt808d::core::protocol::{
    Jt808FrameCodec, MessageBuilder, MessageHeader, escape, parse_header, unescape,
};
use jt808d::core::session::CloseReason;
use jt808d::core::state::{ConnectionChannels, ConnectionHandle, ServerState};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::DuplexStream;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::codec::Framed;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

pub const TERMINAL_ID: &str = "13800138000";

/// How long a test waits for the server side before giving up.
pub const TIMEOUT: Duration = Duration::from_secs(5);

pub fn init_tracing() {
    // Ignore the error if another test already installed a subscriber.
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::new("warn"))
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .try_init();
}

/// TestContext provides a server state without a listener.
pub struct TestContext {
    pub state: Arc<ServerState>,
}

impl TestContext {
    /// Creates a context with the default configuration and built-in handlers.
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        init_tracing();
        Self {
            state: Arc::new(ServerState::new(config)),
        }
    }

    /// Creates a context with no handlers registered.
    pub fn without_handlers() -> Self {
        init_tracing();
        Self {
            state: Arc::new(ServerState::empty(Config::default())),
        }
    }

    /// Registers a connection with the state without running an event loop.
    pub fn connect(&self) -> (Arc<ConnectionHandle>, ConnectionChannels) {
        self.state
            .open_connection("127.0.0.1:40000".parse().expect("valid address"))
    }

    /// Runs a connection event loop over an in-memory duplex stream.
    pub fn spawn_connection(&self) -> TestConnection {
        let (client, server) = tokio::io::duplex(4096);
        let (connection, channels) = self.connect();
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let handler = ConnectionHandler::new(
            server,
            self.state.clone(),
            connection.clone(),
            channels,
            shutdown_rx,
        );
        TestConnection {
            client: Framed::new(client, Jt808FrameCodec::default()),
            connection,
            task: tokio::spawn(handler.run()),
            shutdown_tx,
        }
    }
}

/// The terminal side of a connection under test.
pub struct TestConnection {
    pub client: Framed<DuplexStream, Jt808FrameCodec>,
    pub connection: Arc<ConnectionHandle>,
    pub task: JoinHandle<Result<CloseReason, Jt808Error>>,
    pub shutdown_tx: broadcast::Sender<()>,
}

impl TestConnection {
    /// Escapes and frames an unescaped message.
    pub async fn send_message(&mut self, message: &[u8]) {
        self.client
            .send(escape(message).freeze())
            .await
            .expect("write to duplex stream");
    }

    /// Frames bytes exactly as given.
    pub async fn send_raw(&mut self, payload: &[u8]) {
        self.client
            .send(Bytes::copy_from_slice(payload))
            .await
            .expect("write to duplex stream");
    }

    /// Reads the next non-empty frame and unescapes it. `None` means EOF.
    pub async fn read_message(&mut self) -> Option<BytesMut> {
        tokio::time::timeout(TIMEOUT, async {
            loop {
                match self.client.next().await {
                    Some(Ok(frame)) if frame.is_empty() => continue,
                    Some(Ok(frame)) => return Some(unescape(&frame).expect("valid escaping")),
                    Some(Err(_)) | None => return None,
                }
            }
        })
        .await
        .expect("timed out waiting for a frame")
    }

    /// Waits for the event loop to exit.
    pub async fn finish(self) -> Result<CloseReason, Jt808Error> {
        let TestConnection { client, task, .. } = self;
        let result = tokio::time::timeout(TIMEOUT, task)
            .await
            .expect("connection did not close in time")
            .expect("connection task panicked");
        drop(client);
        result
    }
}

/// Builds an unescaped 2013 message from the test terminal.
pub fn message(message_id: u16, serial: u16, body: &[u8]) -> Bytes {
    MessageBuilder::new(message_id, TERMINAL_ID, serial)
        .body(body.to_vec())
        .build()
        .expect("valid message")
}

/// Verifies the check code and parses an unescaped message.
pub fn parse(message: &[u8]) -> (MessageHeader, Vec<u8>) {
    let (header, body) =
        parse_header(split_check_code(message, true).expect("valid check code"))
            .expect("valid header");
    (header, body.to_vec())
}
