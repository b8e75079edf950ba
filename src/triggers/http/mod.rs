//! HTTP event trigger handlers
//!
//! One endpoint per domain emitter:
//! - Parking occupancy updates
//! - Reservation creation
//! - Charging session updates
//! - Marketplace transactions
//! - User notifications

mod handlers;
mod models;

pub use handlers::{
    charging_session, marketplace_transaction, parking_update, reservation_created,
    send_notification,
};
pub use models::{SendNotificationRequest, TriggerResponse};
