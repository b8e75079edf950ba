//! API layer - HTTP endpoint handlers organized by domain.

mod health;
mod metrics;
mod rooms;
mod routes;

pub use health::{health, stats, HealthResponse, StatsResponse};
pub use metrics::prometheus_metrics;
pub use rooms::{get_room, list_rooms, RoomListResponse};
pub use routes::api_routes;
