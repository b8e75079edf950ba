//! Entry points through which the marketplace backend publishes events.

mod http;

pub use http::{
    charging_session, marketplace_transaction, parking_update, reservation_created,
    send_notification, SendNotificationRequest, TriggerResponse,
};
