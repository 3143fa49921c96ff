// src/core/metrics.rs

//! Defines and registers Prometheus metrics for gateway monitoring.
//!
//! This module uses `lazy_static` to ensure that metrics are registered only once
//! globally for the entire application lifecycle.

use lazy_static::lazy_static;
use prometheus::{
    Counter, CounterVec, Gauge, Histogram, TextEncoder, register_counter, register_counter_vec,
    register_gauge, register_histogram,
};

lazy_static! {
    // --- Gauges ---
    /// The number of terminal connections currently open.
    pub static ref CONNECTED_TERMINALS: Gauge =
        register_gauge!("jt808_connected_terminals", "Number of currently open terminal connections.").unwrap();
    /// The number of sessions in the session table.
    pub static ref ACTIVE_SESSIONS: Gauge =
        register_gauge!("jt808_active_sessions", "Number of terminal sessions currently bound.").unwrap();

    // --- Counters ---
    pub static ref CONNECTIONS_ACCEPTED_TOTAL: Counter =
        register_counter!("jt808_connections_accepted_total", "Total number of connections accepted.").unwrap();
    pub static ref FRAMES_RECEIVED_TOTAL: Counter =
        register_counter!("jt808_frames_received_total", "Total number of non-empty frames received.").unwrap();
    /// Frames whose message id is not registered.
    pub static ref FRAMES_DROPPED_TOTAL: Counter =
        register_counter!("jt808_frames_dropped_total", "Total number of frames dropped for an unknown message id.").unwrap();
    pub static ref DECODE_ERRORS_TOTAL: Counter =
        register_counter!("jt808_decode_errors_total", "Total number of frames that failed to decode.").unwrap();
    pub static ref HANDLER_FAULTS_TOTAL: Counter =
        register_counter!("jt808_handler_faults_total", "Total number of message handler faults.").unwrap();
    /// Sessions leaving the table, labeled by close reason.
    pub static ref SESSIONS_CLOSED_TOTAL: CounterVec =
        register_counter_vec!("jt808_sessions_closed_total", "Total number of sessions closed, labeled by reason.", &["reason"]).unwrap();

    // --- Histograms ---
    pub static ref DISPATCH_LATENCY_SECONDS: Histogram =
        register_histogram!("jt808_dispatch_latency_seconds", "Latency of message dispatch in seconds.").unwrap();
}

/// Gathers all registered metrics and encodes them in the Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder
        .encode_to_string(&metric_families)
        .unwrap_or_else(|e| format!("# failed to encode metrics: {e}\n"))
}
