//! Helper structs for recording metrics

use prometheus::{Encoder, TextEncoder};

use crate::connection_manager::{ConnectionStats, SweepReport};

use super::{
    CONNECTIONS_TOTAL, EVENTS_TRIGGERED_TOTAL, HEARTBEAT_DURATION_MS, HEARTBEAT_PROBES_TOTAL,
    HEARTBEAT_TERMINATED_TOTAL, MESSAGES_DELIVERED_TOTAL, MESSAGES_DROPPED_TOTAL,
    MESSAGES_SENT_TOTAL, PROCESS_MEMORY_BYTES, ROOMS_ACTIVE, USERS_CONNECTED,
    WS_MESSAGES_RECEIVED,
};

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}

pub struct BroadcastMetrics;

impl BroadcastMetrics {
    /// `target` is one of "user", "room", "all"
    pub fn record_sent(target: &str) {
        MESSAGES_SENT_TOTAL.with_label_values(&[target]).inc();
    }

    pub fn record_delivered(count: u64) {
        MESSAGES_DELIVERED_TOTAL.inc_by(count);
    }

    pub fn record_dropped() {
        MESSAGES_DROPPED_TOTAL.inc();
    }
}

/// Presence gauges, refreshed from a stats snapshot
pub struct PresenceMetrics;

impl PresenceMetrics {
    pub fn update(stats: &ConnectionStats) {
        CONNECTIONS_TOTAL.set(stats.total_connections as i64);
        USERS_CONNECTED.set(stats.authenticated_users as i64);
        ROOMS_ACTIVE.set(stats.active_rooms as i64);
    }
}

pub struct WsMessageMetrics;

impl WsMessageMetrics {
    /// Record an inbound client message by its `type`
    pub fn record(kind: &str) {
        WS_MESSAGES_RECEIVED.with_label_values(&[kind]).inc();
    }

    /// Record a frame that could not be understood
    pub fn record_invalid() {
        WS_MESSAGES_RECEIVED.with_label_values(&["invalid"]).inc();
    }
}

pub struct HeartbeatMetrics;

impl HeartbeatMetrics {
    pub fn record_sweep(report: &SweepReport, elapsed_ms: u64) {
        HEARTBEAT_PROBES_TOTAL.inc_by(report.probed as u64);
        HEARTBEAT_TERMINATED_TOTAL.inc_by(report.terminated as u64);
        HEARTBEAT_DURATION_MS.observe(elapsed_ms as f64);
    }
}

pub struct EventMetrics;

impl EventMetrics {
    pub fn record_triggered(event: &str) {
        EVENTS_TRIGGERED_TOTAL.with_label_values(&[event]).inc();
    }
}

pub struct MemoryMetrics;

impl MemoryMetrics {
    /// Update process memory metric (call periodically)
    pub fn update_process_memory() {
        #[cfg(target_os = "linux")]
        {
            if let Ok(status) = std::fs::read_to_string("/proc/self/status") {
                let rss_kb = status
                    .lines()
                    .find(|line| line.starts_with("VmRSS:"))
                    .and_then(|line| line.split_whitespace().nth(1))
                    .and_then(|kb| kb.parse::<i64>().ok());
                if let Some(kb) = rss_kb {
                    PROCESS_MEMORY_BYTES.set(kb * 1024);
                }
            }
        }
    }
}
