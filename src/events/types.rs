use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Identifier of a row owned by the marketplace backend.
///
/// Parking lots use integer keys while users and charging stations use
/// UUID strings, so both forms are accepted and echoed back unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordId {
    Int(i64),
    Text(String),
}

impl RecordId {
    /// Whether the id can address a user or a room
    pub fn is_blank(&self) -> bool {
        match self {
            Self::Int(_) => false,
            Self::Text(s) => s.trim().is_empty(),
        }
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(id) => write!(f, "{}", id),
            Self::Text(id) => f.write_str(id),
        }
    }
}

impl From<i64> for RecordId {
    fn from(id: i64) -> Self {
        Self::Int(id)
    }
}

impl From<&str> for RecordId {
    fn from(id: &str) -> Self {
        Self::Text(id.to_string())
    }
}

impl From<String> for RecordId {
    fn from(id: String) -> Self {
        Self::Text(id)
    }
}

/// Domain payload stamped with the time it was published
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventData<T> {
    #[serde(flatten)]
    pub record: T,
    pub timestamp: DateTime<Utc>,
}

impl<T> EventData<T> {
    pub fn now(record: T) -> Self {
        Self {
            record,
            timestamp: Utc::now(),
        }
    }
}

/// Occupancy change of a parking lot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParkingUpdate {
    pub parking_lot_id: RecordId,
    pub available_spots: u32,
    pub occupied_spots: u32,
}

/// Columns carried through to clients untouched
pub type Fields = Map<String, Value>;

/// Newly created reservation
///
/// Only the routing keys are typed; every other column of the row is
/// forwarded as received.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reservation {
    /// Driver who made the reservation
    pub user_id: RecordId,
    /// Owner of the parking lot, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<RecordId>,
    #[serde(alias = "lot_id")]
    pub parking_lot_id: RecordId,
    #[serde(flatten)]
    pub fields: Fields,
}

/// State change of an EV charging session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChargingSession {
    pub user_id: RecordId,
    pub station_id: RecordId,
    #[serde(flatten)]
    pub fields: Fields,
}

/// Settled purchase of parking asset tokens
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketplaceTransaction {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buyer_id: Option<RecordId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seller_id: Option<RecordId>,
    #[serde(flatten)]
    pub fields: Fields,
}

/// User-facing notification shown in the notification center
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Notification {
    /// Category used by the client to pick an icon (e.g. "reservation", "reward")
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(flatten)]
    pub fields: Fields,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_id_accepts_numbers_and_strings() {
        let numeric: RecordId = serde_json::from_value(json!(42)).unwrap();
        let text: RecordId = serde_json::from_value(json!("b7f1c2")).unwrap();

        assert_eq!(numeric, RecordId::Int(42));
        assert_eq!(text, RecordId::Text("b7f1c2".to_string()));
        assert_eq!(serde_json::to_value(&numeric).unwrap(), json!(42));
        assert_eq!(numeric.to_string(), "42");
    }

    #[test]
    fn test_blank_record_id() {
        assert!(RecordId::from("  ").is_blank());
        assert!(!RecordId::from("u1").is_blank());
        assert!(!RecordId::from(0).is_blank());
    }

    #[test]
    fn test_parking_update_uses_camel_case() {
        let update = ParkingUpdate {
            parking_lot_id: RecordId::from(5),
            available_spots: 3,
            occupied_spots: 7,
        };

        let value = serde_json::to_value(EventData::now(update)).unwrap();
        assert_eq!(value["parkingLotId"], 5);
        assert_eq!(value["availableSpots"], 3);
        assert_eq!(value["occupiedSpots"], 7);
        assert!(value["timestamp"].is_string());
    }

    #[test]
    fn test_reservation_accepts_lot_id_alias() {
        let reservation: Reservation = serde_json::from_value(json!({
            "id": 91,
            "user_id": "driver-1",
            "lot_id": 5,
            "license_plate": "WA 12345",
            "price": 18.5,
            "status": "pending"
        }))
        .unwrap();

        assert_eq!(reservation.parking_lot_id, RecordId::Int(5));
        assert_eq!(reservation.owner_id, None);
        assert_eq!(reservation.fields["license_plate"], "WA 12345");

        let value = serde_json::to_value(&reservation).unwrap();
        assert_eq!(value["parking_lot_id"], 5);
        assert_eq!(value["id"], 91);
        assert_eq!(value["price"], 18.5);
        assert!(value.get("owner_id").is_none());
    }

    #[test]
    fn test_charging_session_keeps_unlisted_columns() {
        let session: ChargingSession = serde_json::from_value(json!({
            "id": 3,
            "user_id": "u1",
            "station_id": 9,
            "start_time": "2024-05-01T10:00:00",
            "energy_delivered_kwh": 4.2,
            "charging_stations": {"name": "Station A", "connector_type": "CCS"}
        }))
        .unwrap();

        assert_eq!(session.station_id, RecordId::Int(9));

        let value = serde_json::to_value(&session).unwrap();
        assert_eq!(value["charging_stations"]["name"], "Station A");
        assert_eq!(value["start_time"], "2024-05-01T10:00:00");
        assert_eq!(value["energy_delivered_kwh"], 4.2);
    }

    #[test]
    fn test_notification_fields_are_optional() {
        let notification: Notification = serde_json::from_value(json!({
            "type": "reward",
            "message": "You earned 2.50 USDC",
            "read": false
        }))
        .unwrap();

        assert_eq!(notification.kind.as_deref(), Some("reward"));
        assert_eq!(notification.title, None);

        let value = serde_json::to_value(&notification).unwrap();
        assert_eq!(value["type"], "reward");
        assert_eq!(value["read"], false);
        assert!(value.get("title").is_none());
    }
}
