//! Domain events pushed by upstream producers.
//!
//! Every event published to clients carries one of these payloads and is
//! routed to the rooms named in [`rooms`].

pub mod rooms;
mod types;

pub use types::{
    ChargingSession, EventData, Fields, MarketplaceTransaction, Notification, ParkingUpdate, RecordId,
    Reservation,
};
