//! Fan-out of server events to users, rooms and every connection.
//!
//! [`Broadcaster`] holds the three delivery primitives plus the domain
//! emitters built on top of them. Emitters keep no state of their own.

mod broadcaster;

pub use broadcaster::{Broadcaster, DeliveryReport, Target};
