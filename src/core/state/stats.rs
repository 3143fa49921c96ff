// src/core/state/stats.rs

//! Contains state definitions and logic for gateway statistics.

use std::sync::atomic::{AtomicU64, Ordering};

/// In-process counters, readable without going through Prometheus.
#[derive(Debug, Default)]
pub struct StatsState {
    /// The total number of connections accepted since startup.
    total_connections: AtomicU64,
    /// Non-empty frames taken off the wire.
    total_frames: AtomicU64,
    /// Frames dropped because their message id is not registered.
    dropped_frames: AtomicU64,
    /// Connections closed with `SERVER_EXCEPTION_OCCURRED`.
    faulted_connections: AtomicU64,
}

impl StatsState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_total_connections(&self) {
        self.total_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_total_connections(&self) -> u64 {
        self.total_connections.load(Ordering::Relaxed)
    }

    pub fn increment_total_frames(&self) {
        self.total_frames.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_total_frames(&self) -> u64 {
        self.total_frames.load(Ordering::Relaxed)
    }

    pub fn increment_dropped_frames(&self) {
        self.dropped_frames.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_dropped_frames(&self) -> u64 {
        self.dropped_frames.load(Ordering::Relaxed)
    }

    pub fn increment_faulted_connections(&self) {
        self.faulted_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_faulted_connections(&self) -> u64 {
        self.faulted_connections.load(Ordering::Relaxed)
    }
}
