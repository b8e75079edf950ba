//! HTTP event trigger handlers

use axum::{extract::rejection::JsonRejection, extract::State, Json};

use crate::error::{AppError, Result};
use crate::events::{ChargingSession, MarketplaceTransaction, ParkingUpdate, RecordId, Reservation};
use crate::metrics::EventMetrics;
use crate::server::AppState;

use super::models::{SendNotificationRequest, TriggerResponse};

/// Unwrap a JSON body, reporting shape errors as validation failures
fn body<T>(payload: std::result::Result<Json<T>, JsonRejection>) -> Result<T> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| AppError::Validation(rejection.body_text()))
}

fn require(id: &RecordId, what: &str) -> Result<()> {
    if id.is_blank() {
        return Err(AppError::Validation(format!("{} required", what)));
    }
    Ok(())
}

/// Occupancy change of a parking lot
#[tracing::instrument(name = "http.parking_update", skip(state, payload))]
pub async fn parking_update(
    State(state): State<AppState>,
    payload: std::result::Result<Json<ParkingUpdate>, JsonRejection>,
) -> Result<Json<TriggerResponse>> {
    let update = body(payload)?;
    require(&update.parking_lot_id, "Parking lot ID")?;

    EventMetrics::record_triggered("parking_update");
    let report = state.broadcaster.emit_parking_update(
        update.parking_lot_id,
        update.available_spots,
        update.occupied_spots,
    );

    Ok(Json(report.into()))
}

/// Newly created reservation
#[tracing::instrument(name = "http.reservation_created", skip(state, payload))]
pub async fn reservation_created(
    State(state): State<AppState>,
    payload: std::result::Result<Json<Reservation>, JsonRejection>,
) -> Result<Json<TriggerResponse>> {
    let reservation = body(payload)?;
    require(&reservation.user_id, "User ID")?;
    require(&reservation.parking_lot_id, "Parking lot ID")?;

    EventMetrics::record_triggered("reservation_created");
    let report = state.broadcaster.emit_reservation_created(reservation);

    Ok(Json(report.into()))
}

#[tracing::instrument(name = "http.charging_session", skip(state, payload))]
pub async fn charging_session(
    State(state): State<AppState>,
    payload: std::result::Result<Json<ChargingSession>, JsonRejection>,
) -> Result<Json<TriggerResponse>> {
    let session = body(payload)?;
    require(&session.user_id, "User ID")?;
    require(&session.station_id, "Station ID")?;

    EventMetrics::record_triggered("charging_session_update");
    let report = state.broadcaster.emit_charging_session_update(session);

    Ok(Json(report.into()))
}

#[tracing::instrument(name = "http.marketplace_transaction", skip(state, payload))]
pub async fn marketplace_transaction(
    State(state): State<AppState>,
    payload: std::result::Result<Json<MarketplaceTransaction>, JsonRejection>,
) -> Result<Json<TriggerResponse>> {
    let transaction = body(payload)?;
    // Blank parties are dropped rather than rejected; the feed still gets the trade
    let transaction = MarketplaceTransaction {
        buyer_id: transaction.buyer_id.filter(|id| !id.is_blank()),
        seller_id: transaction.seller_id.filter(|id| !id.is_blank()),
        ..transaction
    };

    EventMetrics::record_triggered("marketplace_transaction");
    let report = state.broadcaster.emit_marketplace_transaction(transaction);

    Ok(Json(report.into()))
}

/// Notification for one user
#[tracing::instrument(name = "http.send_notification", skip(state, payload))]
pub async fn send_notification(
    State(state): State<AppState>,
    payload: std::result::Result<Json<SendNotificationRequest>, JsonRejection>,
) -> Result<Json<TriggerResponse>> {
    let request = body(payload)?;
    require(&request.user_id, "User ID")?;

    tracing::debug!(user_id = %request.user_id, "Sending notification");
    EventMetrics::record_triggered("notification");
    let report = state
        .broadcaster
        .emit_notification(&request.user_id.to_string(), request.notification);

    Ok(Json(report.into()))
}
