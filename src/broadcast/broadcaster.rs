use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::connection_manager::{ConnectionHandle, ConnectionManager, SendError};
use crate::events::{
    rooms, ChargingSession, EventData, Fields, MarketplaceTransaction, Notification,
    ParkingUpdate, RecordId, Reservation,
};
use crate::metrics::BroadcastMetrics;
use crate::websocket::{OutboundMessage, ServerEvent, ServerMessage};

/// Resolved audience of one fan-out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target<'a> {
    User(&'a str),
    Room(&'a str),
    All,
}

impl Target<'_> {
    /// Label used for metrics
    pub fn kind(&self) -> &'static str {
        match self {
            Self::User(_) => "user",
            Self::Room(_) => "room",
            Self::All => "all",
        }
    }
}

impl fmt::Display for Target<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User(user_id) => write!(f, "user:{}", user_id),
            Self::Room(room) => write!(f, "room:{}", room),
            Self::All => f.write_str("all"),
        }
    }
}

/// Recipients reached by one emitter call, summed over its targets.
///
/// A connection that is both addressed as a user and a room member is
/// counted once per target it received the event through.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryReport {
    pub delivered_to: usize,
    pub targets: usize,
}

impl DeliveryReport {
    fn record(&mut self, delivered: usize) {
        self.delivered_to += delivered;
        self.targets += 1;
    }
}

/// Pushes events to live connections.
///
/// Delivery is best effort: frames are queued without waiting, closed
/// connections are skipped, and a full outbound queue drops the frame for
/// that connection only.
pub struct Broadcaster {
    connection_manager: Arc<ConnectionManager>,
}

impl Broadcaster {
    pub fn new(connection_manager: Arc<ConnectionManager>) -> Self {
        Self { connection_manager }
    }

    /// Send to every session of a user. Returns the number of recipients.
    pub fn send_to_user(&self, user_id: &str, message: &ServerMessage) -> usize {
        let connections = self.connection_manager.get_user_connections(user_id);
        if connections.is_empty() {
            tracing::debug!(user_id = %user_id, "No connections found for user");
        }
        self.deliver(Target::User(user_id), &connections, message)
    }

    /// Send to every member of a room. Returns the number of recipients.
    pub fn send_to_room(&self, room: &str, message: &ServerMessage) -> usize {
        let connections = self.connection_manager.get_room_connections(room);
        if connections.is_empty() {
            tracing::debug!(room = %room, "Room not found");
        }
        self.deliver(Target::Room(room), &connections, message)
    }

    /// Send to every open connection. Returns the number of recipients.
    pub fn send_to_all(&self, message: &ServerMessage) -> usize {
        let connections = self.connection_manager.get_all_connections();
        self.deliver(Target::All, &connections, message)
    }

    /// Occupancy change: the lot's room and the parking feed
    pub fn emit_parking_update(
        &self,
        parking_lot_id: impl Into<RecordId>,
        available_spots: u32,
        occupied_spots: u32,
    ) -> DeliveryReport {
        let update = ParkingUpdate {
            parking_lot_id: parking_lot_id.into(),
            available_spots,
            occupied_spots,
        };
        let lot_room = rooms::parking_lot(&update.parking_lot_id);
        let message = ServerMessage::new(ServerEvent::ParkingUpdate {
            data: EventData::now(update),
        });

        let mut report = DeliveryReport::default();
        report.record(self.send_to_room(&lot_room, &message));
        report.record(self.send_to_room(rooms::PARKING_FEED, &message));
        report
    }

    /// New reservation: the driver, the lot owner and the lot's room
    pub fn emit_reservation_created(&self, mut reservation: Reservation) -> DeliveryReport {
        restamp(&mut reservation.fields);
        let user_id = reservation.user_id.to_string();
        let owner_id = reservation.owner_id.as_ref().map(ToString::to_string);
        let lot_room = rooms::parking_lot(&reservation.parking_lot_id);
        let message = ServerMessage::new(ServerEvent::ReservationCreated {
            data: EventData::now(reservation),
        });

        let mut report = DeliveryReport::default();
        report.record(self.send_to_user(&user_id, &message));
        if let Some(owner_id) = owner_id {
            report.record(self.send_to_user(&owner_id, &message));
        }
        report.record(self.send_to_room(&lot_room, &message));
        report
    }

    /// Charging session change: the driver, the station's room and the charging feed
    pub fn emit_charging_session_update(&self, mut session: ChargingSession) -> DeliveryReport {
        restamp(&mut session.fields);
        let user_id = session.user_id.to_string();
        let station_room = rooms::charging_station(&session.station_id);
        let message = ServerMessage::new(ServerEvent::ChargingSessionUpdate {
            data: EventData::now(session),
        });

        let mut report = DeliveryReport::default();
        report.record(self.send_to_user(&user_id, &message));
        report.record(self.send_to_room(&station_room, &message));
        report.record(self.send_to_room(rooms::CHARGING_FEED, &message));
        report
    }

    /// Settled trade: buyer, seller and the marketplace feed
    pub fn emit_marketplace_transaction(&self, mut transaction: MarketplaceTransaction) -> DeliveryReport {
        restamp(&mut transaction.fields);
        let buyer_id = transaction.buyer_id.as_ref().map(ToString::to_string);
        let seller_id = transaction.seller_id.as_ref().map(ToString::to_string);
        let message = ServerMessage::new(ServerEvent::MarketplaceTransaction {
            data: EventData::now(transaction),
        });

        let mut report = DeliveryReport::default();
        if let Some(buyer_id) = buyer_id {
            report.record(self.send_to_user(&buyer_id, &message));
        }
        if let Some(seller_id) = seller_id {
            report.record(self.send_to_user(&seller_id, &message));
        }
        report.record(self.send_to_room(rooms::MARKETPLACE_FEED, &message));
        report
    }

    /// Notification for one user
    pub fn emit_notification(&self, user_id: &str, mut notification: Notification) -> DeliveryReport {
        restamp(&mut notification.fields);
        let message = ServerMessage::new(ServerEvent::Notification {
            data: EventData::now(notification),
        });

        let mut report = DeliveryReport::default();
        report.record(self.send_to_user(user_id, &message));
        report
    }

    /// Encode once, queue the same bytes on every open connection
    fn deliver(
        &self,
        target: Target<'_>,
        connections: &[Arc<ConnectionHandle>],
        message: &ServerMessage,
    ) -> usize {
        BroadcastMetrics::record_sent(target.kind());

        if connections.is_empty() {
            tracing::info!(audience = %target, event_type = message.event_type(), recipients = 0, "Broadcast sent");
            return 0;
        }

        let outbound = match OutboundMessage::preserialized(message) {
            Ok(outbound) => outbound,
            Err(e) => {
                tracing::error!(audience = %target, error = %e, "Failed to serialize broadcast");
                return 0;
            }
        };

        let mut delivered = 0;
        for conn in connections {
            if !conn.is_open() {
                continue;
            }
            match conn.send_outbound(outbound.clone()) {
                Ok(()) => delivered += 1,
                Err(SendError::Full) => {
                    BroadcastMetrics::record_dropped();
                    tracing::warn!(
                        connection_id = %conn.id,
                        audience = %target,
                        "Outbound queue full, message dropped"
                    );
                }
                Err(SendError::Closed) => {}
            }
        }

        BroadcastMetrics::record_delivered(delivered as u64);
        tracing::info!(
            audience = %target,
            event_type = message.event_type(),
            recipients = delivered,
            "Broadcast sent"
        );

        delivered
    }
}

/// The publish time replaces any `timestamp` column of the record
fn restamp(fields: &mut Fields) {
    fields.remove("timestamp");
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::sync::mpsc;

    fn fields(value: serde_json::Value) -> Fields {
        match value {
            serde_json::Value::Object(map) => map,
            other => panic!("expected an object, got {}", other),
        }
    }

    fn setup() -> (Arc<ConnectionManager>, Broadcaster) {
        let manager = Arc::new(ConnectionManager::new());
        let broadcaster = Broadcaster::new(manager.clone());
        (manager, broadcaster)
    }

    fn connect(
        manager: &ConnectionManager,
        buffer: usize,
    ) -> (Arc<ConnectionHandle>, mpsc::Receiver<OutboundMessage>) {
        let (tx, mut rx) = mpsc::channel(buffer);
        let handle = manager.accept(tx).unwrap();
        let _ = rx.try_recv();
        (handle, rx)
    }

    fn drain_json(rx: &mut mpsc::Receiver<OutboundMessage>) -> Vec<serde_json::Value> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            if let Some(text) = msg.to_json().unwrap() {
                out.push(serde_json::from_str(&text).unwrap());
            }
        }
        out
    }

    #[test]
    fn test_send_to_missing_targets() {
        let (_manager, broadcaster) = setup();
        let message = ServerMessage::pong();

        assert_eq!(broadcaster.send_to_user("ghost", &message), 0);
        assert_eq!(broadcaster.send_to_room("parking_404", &message), 0);
        assert_eq!(broadcaster.send_to_all(&message), 0);
    }

    #[test]
    fn test_send_to_user_reaches_every_session() {
        let (manager, broadcaster) = setup();
        let (tab_a, mut rx_a) = connect(&manager, 8);
        let (tab_b, mut rx_b) = connect(&manager, 8);
        let (_other, mut rx_other) = connect(&manager, 8);
        manager.authenticate(tab_a.id, "u1").unwrap();
        manager.authenticate(tab_b.id, "u1").unwrap();
        drain_json(&mut rx_a);
        drain_json(&mut rx_b);

        assert_eq!(broadcaster.send_to_user("u1", &ServerMessage::pong()), 2);
        assert_eq!(drain_json(&mut rx_a).len(), 1);
        assert_eq!(drain_json(&mut rx_b).len(), 1);
        assert!(drain_json(&mut rx_other).is_empty());
    }

    #[test]
    fn test_closed_connections_are_skipped() {
        let (manager, broadcaster) = setup();
        let (_open, _rx_open) = connect(&manager, 8);
        let (_closed, rx_closed) = connect(&manager, 8);
        drop(rx_closed);

        assert_eq!(broadcaster.send_to_all(&ServerMessage::pong()), 1);
    }

    #[test]
    fn test_full_queue_drops_without_blocking() {
        let (manager, broadcaster) = setup();
        let (handle, mut rx) = connect(&manager, 1);
        manager.join_room(handle.id, "parking_feed").unwrap();

        // joined_room confirmation occupies the only slot
        assert_eq!(broadcaster.send_to_room("parking_feed", &ServerMessage::pong()), 0);
        assert_eq!(drain_json(&mut rx).len(), 1);
        assert_eq!(broadcaster.send_to_room("parking_feed", &ServerMessage::pong()), 1);
    }

    #[test]
    fn test_parking_update_routing() {
        let (manager, broadcaster) = setup();
        let (lot_member, mut lot_rx) = connect(&manager, 8);
        let (feed_member, mut feed_rx) = connect(&manager, 8);
        manager.join_room(lot_member.id, "parking_5").unwrap();
        manager.join_room(feed_member.id, "parking_feed").unwrap();
        drain_json(&mut lot_rx);
        drain_json(&mut feed_rx);

        let report = broadcaster.emit_parking_update(5, 3, 7);
        assert_eq!(report, DeliveryReport { delivered_to: 2, targets: 2 });

        let events = drain_json(&mut lot_rx);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0]["type"], "parking_update");
        assert_eq!(events[0]["data"]["parkingLotId"], 5);
        assert_eq!(events[0]["data"]["availableSpots"], 3);
        assert_eq!(events[0]["data"]["occupiedSpots"], 7);
        assert_eq!(drain_json(&mut feed_rx).len(), 1);
    }

    #[test]
    fn test_reservation_routing() {
        let (manager, broadcaster) = setup();
        let (driver, mut driver_rx) = connect(&manager, 8);
        let (owner, mut owner_rx) = connect(&manager, 8);
        let (watcher, mut watcher_rx) = connect(&manager, 8);
        manager.authenticate(driver.id, "driver-1").unwrap();
        manager.authenticate(owner.id, "owner-1").unwrap();
        manager.join_room(watcher.id, "parking_12").unwrap();
        drain_json(&mut driver_rx);
        drain_json(&mut owner_rx);
        drain_json(&mut watcher_rx);

        let report = broadcaster.emit_reservation_created(Reservation {
            user_id: RecordId::from("driver-1"),
            owner_id: Some(RecordId::from("owner-1")),
            parking_lot_id: RecordId::from(12),
            fields: fields(json!({
                "id": 77,
                "license_plate": "KR 5T4RT",
                "price": 12.0,
                "status": "pending",
                "timestamp": "2020-01-01T00:00:00Z"
            })),
        });

        assert_eq!(report, DeliveryReport { delivered_to: 3, targets: 3 });
        for rx in [&mut driver_rx, &mut owner_rx, &mut watcher_rx] {
            let events = drain_json(rx);
            assert_eq!(events.len(), 1);
            assert_eq!(events[0]["type"], "reservation_created");
            assert_eq!(events[0]["data"]["id"], 77);
            assert_eq!(events[0]["data"]["license_plate"], "KR 5T4RT");
            assert_ne!(events[0]["data"]["timestamp"], "2020-01-01T00:00:00Z");
        }
    }

    #[test]
    fn test_charging_session_routing() {
        let (manager, broadcaster) = setup();
        let (driver, mut driver_rx) = connect(&manager, 8);
        let (station, mut station_rx) = connect(&manager, 8);
        let (feed, mut feed_rx) = connect(&manager, 8);
        manager.authenticate(driver.id, "driver-2").unwrap();
        manager.join_room(station.id, "charging_st-9").unwrap();
        manager.join_room(feed.id, "charging_feed").unwrap();
        drain_json(&mut driver_rx);
        drain_json(&mut station_rx);
        drain_json(&mut feed_rx);

        let report = broadcaster.emit_charging_session_update(ChargingSession {
            user_id: RecordId::from("driver-2"),
            station_id: RecordId::from("st-9"),
            fields: fields(json!({
                "status": "completed",
                "energy_delivered_kwh": 21.4,
                "charging_stations": {"name": "Station A"}
            })),
        });

        assert_eq!(report, DeliveryReport { delivered_to: 3, targets: 3 });
        let events = drain_json(&mut driver_rx);
        assert_eq!(events[0]["data"]["station_id"], "st-9");
        assert_eq!(events[0]["data"]["charging_stations"]["name"], "Station A");
        assert_eq!(drain_json(&mut station_rx).len(), 1);
        assert_eq!(drain_json(&mut feed_rx).len(), 1);
    }

    #[test]
    fn test_marketplace_transaction_without_parties() {
        let (manager, broadcaster) = setup();
        let (feed, mut feed_rx) = connect(&manager, 8);
        manager.join_room(feed.id, "marketplace_feed").unwrap();
        drain_json(&mut feed_rx);

        let report = broadcaster.emit_marketplace_transaction(MarketplaceTransaction {
            buyer_id: None,
            seller_id: None,
            fields: fields(json!({"listing_id": 3, "token_amount": 10, "total_amount_usdc": 12.5})),
        });

        assert_eq!(report, DeliveryReport { delivered_to: 1, targets: 1 });
        assert_eq!(drain_json(&mut feed_rx)[0]["type"], "marketplace_transaction");
    }

    #[test]
    fn test_notification_only_reaches_user() {
        let (manager, broadcaster) = setup();
        let (user, mut user_rx) = connect(&manager, 8);
        let (bystander, mut bystander_rx) = connect(&manager, 8);
        manager.authenticate(user.id, "u5").unwrap();
        manager.join_room(bystander.id, "parking_feed").unwrap();
        drain_json(&mut user_rx);
        drain_json(&mut bystander_rx);

        let report = broadcaster.emit_notification(
            "u5",
            Notification {
                kind: Some("reward".to_string()),
                title: Some("Inspection approved".to_string()),
                message: Some("You earned 2.50 USDC".to_string()),
                fields: Fields::new(),
            },
        );

        assert_eq!(report.delivered_to, 1);
        assert_eq!(drain_json(&mut user_rx)[0]["data"]["title"], "Inspection approved");
        assert!(drain_json(&mut bystander_rx).is_empty());
    }
}
