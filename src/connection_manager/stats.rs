//! Connection statistics and info structures

use serde::Serialize;

/// Connection statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStats {
    pub total_connections: usize,
    pub authenticated_users: usize,
    pub active_rooms: usize,
}

/// Room information
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomInfo {
    pub name: String,
    pub member_count: usize,
}

/// Outcome of one heartbeat sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Connections sent a fresh probe
    pub probed: usize,
    /// Connections closed for missing the previous probe
    pub terminated: usize,
}
