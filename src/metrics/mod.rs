//! Prometheus metrics for the realtime service.
//!
//! - Presence gauges (connections, authenticated users, rooms)
//! - Fan-out counters by target kind, plus dropped frames
//! - WebSocket lifecycle and inbound message counters
//! - Heartbeat sweep outcomes
//! - Domain events accepted from the backend

mod helpers;

pub use helpers::{
    encode_metrics, BroadcastMetrics, EventMetrics, HeartbeatMetrics, MemoryMetrics,
    PresenceMetrics, WsMessageMetrics,
};

use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};

/// Prefix for all metrics
const METRIC_PREFIX: &str = "parkchain";

lazy_static! {
    // ============================================================================
    // Presence Metrics
    // ============================================================================

    /// Open WebSocket connections
    pub static ref CONNECTIONS_TOTAL: IntGauge = register_int_gauge!(
        format!("{}_connections_total", METRIC_PREFIX),
        "Number of open WebSocket connections"
    ).unwrap();

    /// Distinct authenticated users
    pub static ref USERS_CONNECTED: IntGauge = register_int_gauge!(
        format!("{}_users_connected", METRIC_PREFIX),
        "Number of distinct authenticated users"
    ).unwrap();

    /// Rooms with at least one member
    pub static ref ROOMS_ACTIVE: IntGauge = register_int_gauge!(
        format!("{}_rooms_active", METRIC_PREFIX),
        "Number of rooms with at least one member"
    ).unwrap();

    // ============================================================================
    // Broadcast Metrics
    // ============================================================================

    /// Fan-outs by target kind
    pub static ref MESSAGES_SENT_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_messages_sent_total", METRIC_PREFIX),
        "Total fan-outs by target kind",
        &["target"]
    ).unwrap();

    /// Frames queued on a connection
    pub static ref MESSAGES_DELIVERED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_messages_delivered_total", METRIC_PREFIX),
        "Total frames queued on connections"
    ).unwrap();

    /// Frames dropped because a connection's outbound queue was full
    pub static ref MESSAGES_DROPPED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_messages_dropped_total", METRIC_PREFIX),
        "Total frames dropped on full outbound queues"
    ).unwrap();

    /// Domain events accepted on the trigger API
    pub static ref EVENTS_TRIGGERED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_events_triggered_total", METRIC_PREFIX),
        "Total domain events accepted from the backend",
        &["event"]
    ).unwrap();

    // ============================================================================
    // WebSocket Metrics
    // ============================================================================

    pub static ref WS_CONNECTIONS_OPENED: IntCounter = register_int_counter!(
        format!("{}_ws_connections_opened_total", METRIC_PREFIX),
        "Total WebSocket connections opened"
    ).unwrap();

    pub static ref WS_CONNECTIONS_CLOSED: IntCounter = register_int_counter!(
        format!("{}_ws_connections_closed_total", METRIC_PREFIX),
        "Total WebSocket connections closed"
    ).unwrap();

    /// Client messages by type, including rejected ones
    pub static ref WS_MESSAGES_RECEIVED: IntCounterVec = register_int_counter_vec!(
        format!("{}_ws_messages_received_total", METRIC_PREFIX),
        "Total WebSocket messages received from clients",
        &["type"]
    ).unwrap();

    pub static ref WS_CONNECTION_DURATION: Histogram = register_histogram!(
        format!("{}_ws_connection_duration_seconds", METRIC_PREFIX),
        "WebSocket connection duration in seconds",
        vec![1.0, 5.0, 10.0, 30.0, 60.0, 300.0, 600.0, 1800.0, 3600.0]
    ).unwrap();

    // ============================================================================
    // Heartbeat Metrics
    // ============================================================================

    pub static ref HEARTBEAT_PROBES_TOTAL: IntCounter = register_int_counter!(
        format!("{}_heartbeat_probes_total", METRIC_PREFIX),
        "Total liveness probes sent"
    ).unwrap();

    /// Connections closed for missing a probe
    pub static ref HEARTBEAT_TERMINATED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_heartbeat_terminated_total", METRIC_PREFIX),
        "Total connections terminated by the heartbeat sweep"
    ).unwrap();

    pub static ref HEARTBEAT_DURATION_MS: Histogram = register_histogram!(
        format!("{}_heartbeat_duration_ms", METRIC_PREFIX),
        "Heartbeat sweep duration in milliseconds",
        vec![1.0, 5.0, 10.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 5000.0]
    ).unwrap();

    // ============================================================================
    // Process Metrics
    // ============================================================================

    /// Resident set size in bytes
    pub static ref PROCESS_MEMORY_BYTES: IntGauge = register_int_gauge!(
        format!("{}_process_memory_bytes", METRIC_PREFIX),
        "Process memory usage (RSS) in bytes"
    ).unwrap();
}
