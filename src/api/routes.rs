use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use crate::server::{api_key_auth, AppState};
use crate::triggers::{
    charging_session, marketplace_transaction, parking_update, reservation_created,
    send_notification,
};

use super::health::{health, stats};
use super::metrics::prometheus_metrics;
use super::rooms::{get_room, list_rooms};

pub fn api_routes(state: AppState) -> Router<AppState> {
    Router::new()
        // Health, stats & scraping stay open
        .route("/health", get(health))
        .route("/stats", get(stats))
        .route("/metrics", get(prometheus_metrics))
        .nest(
            "/api/v1",
            Router::new()
                // Producer triggers
                .route("/events/parking-update", post(parking_update))
                .route("/events/reservation-created", post(reservation_created))
                .route("/events/charging-session", post(charging_session))
                .route("/events/marketplace-transaction", post(marketplace_transaction))
                .route("/notifications", post(send_notification))
                // Presence inspection
                .route("/rooms", get(list_rooms))
                .route("/rooms/{name}", get(get_room))
                .route_layer(middleware::from_fn_with_state(state, api_key_auth)),
        )
}
