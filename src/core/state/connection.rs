// src/core/state/connection.rs

//! Contains the handle shared between a connection's event loop and the
//! session registry.

use crate::core::Jt808Error;
use crate::core::session::CloseReason;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU16, Ordering};
use tokio::sync::{broadcast, mpsc};
use tracing::debug;

/// Where the connection is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPhase {
    /// Waiting for the next event.
    Open,
    /// Running one frame through the processing chain.
    Processing,
    /// Terminal state; the socket is being or has been dropped.
    Closed,
}

/// The receiving halves owned by the connection's event loop.
#[derive(Debug)]
pub struct ConnectionChannels {
    /// Fires once, when the connection is asked to close.
    pub close_rx: broadcast::Receiver<CloseReason>,
    /// Unescaped messages queued for this terminal.
    pub outbound_rx: mpsc::Receiver<Bytes>,
}

/// A stable handle to one accepted connection.
///
/// The event loop owns the socket; everything else (sessions, handlers) reaches
/// the connection through this handle to queue writes or request a close.
#[derive(Debug)]
pub struct ConnectionHandle {
    id: u64,
    peer_addr: SocketAddr,
    connected_at: DateTime<Utc>,
    close_reason: Mutex<Option<CloseReason>>,
    phase: Mutex<ConnectionPhase>,
    close_tx: broadcast::Sender<CloseReason>,
    outbound_tx: mpsc::Sender<Bytes>,
    next_serial: AtomicU16,
}

impl ConnectionHandle {
    /// Creates a handle plus the receivers the event loop listens on.
    pub fn new(
        id: u64,
        peer_addr: SocketAddr,
        outbound_capacity: usize,
    ) -> (Arc<Self>, ConnectionChannels) {
        let (close_tx, close_rx) = broadcast::channel(1);
        let (outbound_tx, outbound_rx) = mpsc::channel(outbound_capacity.max(1));
        let handle = Arc::new(Self {
            id,
            peer_addr,
            connected_at: Utc::now(),
            close_reason: Mutex::new(None),
            phase: Mutex::new(ConnectionPhase::Open),
            close_tx,
            outbound_tx,
            next_serial: AtomicU16::new(0),
        });
        (
            handle,
            ConnectionChannels {
                close_rx,
                outbound_rx,
            },
        )
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    pub fn connected_at(&self) -> DateTime<Utc> {
        self.connected_at
    }

    pub fn is_closed(&self) -> bool {
        self.close_reason.lock().is_some()
    }

    /// The event loop's current phase. Stays `Closed` once reached.
    pub fn phase(&self) -> ConnectionPhase {
        *self.phase.lock()
    }

    pub(crate) fn set_phase(&self, phase: ConnectionPhase) {
        let mut slot = self.phase.lock();
        if *slot != ConnectionPhase::Closed {
            *slot = phase;
        }
    }

    /// The reason recorded by the first successful `close`.
    pub fn close_reason(&self) -> Option<CloseReason> {
        *self.close_reason.lock()
    }

    /// Asks the event loop to drop the socket.
    ///
    /// Only the first call has an effect and returns true; later calls are
    /// ignored so that concurrent failure paths never close twice.
    pub fn close(&self, reason: CloseReason) -> bool {
        {
            let mut slot = self.close_reason.lock();
            if slot.is_some() {
                return false;
            }
            *slot = Some(reason);
        }
        debug!("Closing connection {} ({}): {}", self.id, self.peer_addr, reason);
        // The event loop may already be gone; nothing left to notify then.
        let _ = self.close_tx.send(reason);
        true
    }

    /// Queues an unescaped message for delivery to the terminal.
    pub fn send(&self, message: Bytes) -> Result<(), Jt808Error> {
        if self.is_closed() {
            return Err(Jt808Error::ConnectionClosed);
        }
        self.outbound_tx.try_send(message).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => Jt808Error::OutboundQueueFull,
            mpsc::error::TrySendError::Closed(_) => Jt808Error::ConnectionClosed,
        })
    }

    /// Issues the next platform serial number for this connection. Wraps at `u16::MAX`.
    pub fn next_serial(&self) -> u16 {
        self.next_serial.fetch_add(1, Ordering::Relaxed)
    }
}
