//! Prometheus metrics for the viewer.
//!
//! Covers:
//! - Session connection state and reconnects
//! - Inbound frames and routing decisions
//! - Decode failures
//! - Applied diffs, apply latency and published view sizes
//!
//! # Panics
//!
//! Metric registration uses `unwrap()` intentionally. If registration fails,
//! it indicates a fatal configuration error (e.g., duplicate metric names)
//! that should cause an immediate crash at startup rather than silent failure.
//! These panics only occur during static initialization, never at runtime.

use crate::error::{TelemetryError, TelemetryResult};
use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_gauge, register_gauge_vec, register_histogram_vec,
    register_int_counter, CounterVec, Encoder, Gauge, GaugeVec, HistogramVec, IntCounter,
    TextEncoder,
};

/// Session states, as reported by `bmx_ws_state`.
const SESSION_STATES: &[&str] = &[
    "disconnected",
    "connecting",
    "connected",
    "reconnecting",
    "failed",
];

/// WebSocket connection state (1 = connected, 0 = disconnected).
pub static WS_CONNECTED: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!(
        "bmx_ws_connected",
        "WebSocket connection state (1=connected)"
    )
    .unwrap()
});

/// Session state machine current state.
/// Labels: state (disconnected/connecting/connected/reconnecting/failed)
pub static WS_STATE: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "bmx_ws_state",
        "Session state machine current state (1=active, 0=inactive)",
        &["state"]
    )
    .unwrap()
});

/// Reconnect decisions.
/// Labels: outcome (scheduled/exhausted)
pub static WS_RECONNECT_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "bmx_ws_reconnect_total",
        "Session reconnect decisions",
        &["outcome"]
    )
    .unwrap()
});

/// Venue error replies surfaced by the session.
pub static WS_ERRORS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!("bmx_ws_errors_total", "Error replies from the venue").unwrap()
});

/// Text frames delivered to the feed.
pub static FRAMES_RECEIVED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "bmx_frames_received_total",
        "Text frames delivered by the session"
    )
    .unwrap()
});

/// Routing decisions.
/// Labels: outcome (accepted or the ignore reason)
pub static PAYLOADS_ROUTED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "bmx_payloads_routed_total",
        "Payload routing decisions",
        &["outcome"]
    )
    .unwrap()
});

/// Decode failures.
/// Labels: kind (malformed/missing_field/invalid_field/...)
pub static DECODE_FAILURES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "bmx_decode_failures_total",
        "Payloads rejected by the decoder",
        &["kind"]
    )
    .unwrap()
});

/// Applied diffs.
/// Labels: entity (order_book/trade), action (partial/insert/update/delete)
pub static DIFFS_APPLIED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "bmx_diffs_applied_total",
        "Diffs applied to an engine",
        &["entity", "action"]
    )
    .unwrap()
});

/// Time from frame arrival to views published, in microseconds.
pub static APPLY_LATENCY_US: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "bmx_apply_latency_us",
        "Route + decode + apply + publish latency in microseconds",
        &["entity"],
        vec![5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 10000.0]
    )
    .unwrap()
});

/// Published view length.
/// Labels: view (bids/asks/trades)
pub static VIEW_LENGTH: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "bmx_view_length",
        "Entries in the last published view",
        &["view"]
    )
    .unwrap()
});

/// Metrics facade for easy access.
pub struct Metrics;

impl Metrics {
    /// Record WebSocket connected.
    pub fn ws_connected() {
        WS_CONNECTED.set(1.0);
    }

    /// Record WebSocket disconnected.
    pub fn ws_disconnected() {
        WS_CONNECTED.set(0.0);
    }

    /// Set session state.
    /// Only the active state is 1, all others 0.
    pub fn ws_state_set(state: &str) {
        for s in SESSION_STATES {
            WS_STATE.with_label_values(&[s]).set(0.0);
        }
        WS_STATE.with_label_values(&[state]).set(1.0);
    }

    /// Record a reconnect decision.
    pub fn ws_reconnect(outcome: &str) {
        WS_RECONNECT_TOTAL.with_label_values(&[outcome]).inc();
    }

    pub fn ws_error() {
        WS_ERRORS_TOTAL.inc();
    }

    pub fn frame_received() {
        FRAMES_RECEIVED_TOTAL.inc();
    }

    pub fn payload_routed(outcome: &str) {
        PAYLOADS_ROUTED_TOTAL.with_label_values(&[outcome]).inc();
    }

    pub fn decode_failed(kind: &str) {
        DECODE_FAILURES_TOTAL.with_label_values(&[kind]).inc();
    }

    pub fn diff_applied(entity: &str, action: &str) {
        DIFFS_APPLIED_TOTAL
            .with_label_values(&[entity, action])
            .inc();
    }

    pub fn apply_latency(entity: &str, latency_us: f64) {
        APPLY_LATENCY_US
            .with_label_values(&[entity])
            .observe(latency_us);
    }

    pub fn view_length(view: &str, len: usize) {
        VIEW_LENGTH.with_label_values(&[view]).set(len as f64);
    }

    /// Render every registered metric in the text exposition format.
    pub fn gather_text() -> TelemetryResult<String> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&prometheus::gather(), &mut buffer)
            .map_err(|e| TelemetryError::Metrics(e.to_string()))?;
        String::from_utf8(buffer).map_err(|e| TelemetryError::Metrics(e.to_string()))
    }
}
