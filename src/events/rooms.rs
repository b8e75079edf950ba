//! Room names used by the domain emitters.

use std::fmt::Display;

/// Every parking occupancy change
pub const PARKING_FEED: &str = "parking_feed";

/// Every charging session change
pub const CHARGING_FEED: &str = "charging_feed";

/// Every settled marketplace transaction
pub const MARKETPLACE_FEED: &str = "marketplace_feed";

/// Room for a single parking lot
pub fn parking_lot(lot_id: impl Display) -> String {
    format!("parking_{}", lot_id)
}

/// Room for a single charging station
pub fn charging_station(station_id: impl Display) -> String {
    format!("charging_{}", station_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::RecordId;

    #[test]
    fn test_room_names() {
        assert_eq!(parking_lot(5), "parking_5");
        assert_eq!(parking_lot(RecordId::from("lot-a")), "parking_lot-a");
        assert_eq!(charging_station(RecordId::from(12)), "charging_12");
    }
}
