//! Prometheus metrics for the chat relay.
//!
//! Counters and gauges for monitoring the relay:
//! - Connection metrics (active connections, open/close counters, duration)
//! - Registry metrics (registered users)
//! - Event metrics (inbound events by type, dropped frames)
//! - Broadcast metrics (fan-outs by event, deliveries, failures)

use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Encoder, Histogram, IntCounter, IntCounterVec, IntGauge, TextEncoder,
};

/// Prefix for all metrics
const METRIC_PREFIX: &str = "relay";

lazy_static! {
    // ============================================================================
    // Connection Metrics
    // ============================================================================

    /// Number of currently open WebSocket connections
    pub static ref CONNECTIONS_ACTIVE: IntGauge = register_int_gauge!(
        format!("{}_connections_active", METRIC_PREFIX),
        "Number of currently open WebSocket connections"
    ).unwrap();

    /// Total WebSocket connections opened since startup
    pub static ref CONNECTIONS_OPENED: IntCounter = register_int_counter!(
        format!("{}_connections_opened_total", METRIC_PREFIX),
        "Total WebSocket connections opened"
    ).unwrap();

    /// Total WebSocket connections closed since startup
    pub static ref CONNECTIONS_CLOSED: IntCounter = register_int_counter!(
        format!("{}_connections_closed_total", METRIC_PREFIX),
        "Total WebSocket connections closed"
    ).unwrap();

    /// Connection lifetime in seconds
    pub static ref CONNECTION_DURATION: Histogram = register_histogram!(
        format!("{}_connection_duration_seconds", METRIC_PREFIX),
        "WebSocket connection duration in seconds",
        vec![1.0, 10.0, 60.0, 300.0, 1800.0, 3600.0, 14400.0]
    ).unwrap();

    // ============================================================================
    // Registry Metrics
    // ============================================================================

    /// Number of users currently present in the session registry
    pub static ref USERS_REGISTERED: IntGauge = register_int_gauge!(
        format!("{}_users_registered", METRIC_PREFIX),
        "Number of users currently present in the session registry"
    ).unwrap();

    // ============================================================================
    // Event Metrics
    // ============================================================================

    /// Inbound client events by type
    pub static ref EVENTS_RECEIVED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_events_received_total", METRIC_PREFIX),
        "Inbound client events received",
        &["event"]
    ).unwrap();

    /// Inbound frames dropped (malformed or unsupported)
    pub static ref EVENTS_DROPPED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_events_dropped_total", METRIC_PREFIX),
        "Inbound frames dropped as malformed or unsupported"
    ).unwrap();

    // ============================================================================
    // Broadcast Metrics
    // ============================================================================

    /// Outbound broadcasts by event type
    pub static ref EVENTS_BROADCAST_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_events_broadcast_total", METRIC_PREFIX),
        "Outbound event fan-outs",
        &["event"]
    ).unwrap();

    /// Per-connection deliveries that were accepted
    pub static ref DELIVERIES_TOTAL: IntCounter = register_int_counter!(
        format!("{}_deliveries_total", METRIC_PREFIX),
        "Per-connection event deliveries accepted"
    ).unwrap();

    /// Per-connection deliveries that failed (closed or full channel)
    pub static ref DELIVERY_FAILURES_TOTAL: IntCounter = register_int_counter!(
        format!("{}_delivery_failures_total", METRIC_PREFIX),
        "Per-connection event deliveries that failed"
    ).unwrap();
}

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer).unwrap_or_default())
}

/// Helper struct for recording connection metrics
pub struct ConnectionMetrics;

impl ConnectionMetrics {
    pub fn record_opened(active: usize) {
        CONNECTIONS_OPENED.inc();
        CONNECTIONS_ACTIVE.set(active as i64);
    }

    pub fn record_closed(active: usize, duration_secs: f64) {
        CONNECTIONS_CLOSED.inc();
        CONNECTIONS_ACTIVE.set(active as i64);
        CONNECTION_DURATION.observe(duration_secs);
    }
}

/// Helper struct for recording registry metrics
pub struct RegistryMetrics;

impl RegistryMetrics {
    pub fn set_registered(count: usize) {
        USERS_REGISTERED.set(count as i64);
    }
}

/// Helper struct for recording inbound event metrics
pub struct EventMetrics;

impl EventMetrics {
    pub fn record_received(event: &str) {
        EVENTS_RECEIVED_TOTAL.with_label_values(&[event]).inc();
    }

    pub fn record_dropped() {
        EVENTS_DROPPED_TOTAL.inc();
    }
}

/// Helper struct for recording broadcast metrics
pub struct BroadcastMetrics;

impl BroadcastMetrics {
    pub fn record_broadcast(event: &str) {
        EVENTS_BROADCAST_TOTAL.with_label_values(&[event]).inc();
    }

    pub fn record_delivered(count: u64) {
        DELIVERIES_TOTAL.inc_by(count);
    }

    pub fn record_failed(count: u64) {
        DELIVERY_FAILURES_TOTAL.inc_by(count);
    }
}
