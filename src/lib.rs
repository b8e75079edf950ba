// Core presence and fan-out
pub mod broadcast;
pub mod connection_manager;
pub mod events;

// Supporting modules
pub mod config;
pub mod error;
pub mod metrics;
pub mod shutdown;
pub mod tasks;
pub mod telemetry;

// Application layer
pub mod api;
pub mod server;
pub mod triggers;
pub mod websocket;
