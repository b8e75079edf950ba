//! Connection management for WebSocket clients
//!
//! This module provides:
//! - Connection handle management
//! - User and room indexing
//! - Heartbeat liveness tracking
//! - Connection statistics

mod registry;
mod stats;
mod types;

pub use registry::ConnectionManager;
pub use stats::{ConnectionStats, RoomInfo, SweepReport};
pub use types::{ConnectionHandle, PresenceError, SendError};
