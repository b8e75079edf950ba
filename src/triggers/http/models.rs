//! Request and response models for the trigger API

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::broadcast::DeliveryReport;
use crate::events::{Notification, RecordId};

/// Body of `POST /api/v1/notifications`
#[derive(Debug, Deserialize)]
pub struct SendNotificationRequest {
    #[serde(rename = "userId")]
    pub user_id: RecordId,
    pub notification: Notification,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerResponse {
    pub success: bool,
    /// Connections the event was queued on, summed over every target
    pub delivered_to: usize,
    pub timestamp: DateTime<Utc>,
}

impl From<DeliveryReport> for TriggerResponse {
    fn from(report: DeliveryReport) -> Self {
        Self {
            success: true,
            delivered_to: report.delivered_to,
            timestamp: Utc::now(),
        }
    }
}
