use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use voyago_core::Reservation;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateHotelReservationRequest {
    pub room_type_id: Uuid,
    pub booking_id: Uuid,
    #[serde(default = "default_quantity")]
    pub quantity: i32,
}

fn default_quantity() -> i32 {
    1
}

#[derive(Debug, Serialize)]
pub struct ReservationResponse {
    pub reservation_id: Uuid,
    pub resource_id: Uuid,
    pub booking_id: Uuid,
    pub quantity: i32,
    pub status: String,
    pub expires_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl From<Reservation> for ReservationResponse {
    fn from(r: Reservation) -> Self {
        Self {
            reservation_id: r.id,
            resource_id: r.resource_id,
            booking_id: r.booking_id,
            quantity: r.quantity,
            status: r.status.as_str().to_string(),
            expires_at: r.expires_at,
        }
    }
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/hotel/reservations", post(create_reservation))
        .route("/v1/hotel/reservations/{id}/confirm", post(confirm_reservation))
        .route("/v1/hotel/reservations/{id}/cancel", post(cancel_reservation))
}

/// POST /v1/hotel/reservations
/// Place a hold on a room type for a booking.
async fn create_reservation(
    State(state): State<AppState>,
    Json(req): Json<CreateHotelReservationRequest>,
) -> Result<(StatusCode, Json<ReservationResponse>), AppError> {
    let reservation = state
        .hotel
        .create(req.room_type_id, req.booking_id, req.quantity)
        .await?;

    Ok((StatusCode::CREATED, Json(reservation.into())))
}

/// POST /v1/hotel/reservations/:id/confirm
async fn confirm_reservation(
    State(state): State<AppState>,
    Path(reservation_id): Path<Uuid>,
) -> Result<Json<ReservationResponse>, AppError> {
    let reservation = state.hotel.confirm(reservation_id).await?;
    Ok(Json(reservation.into()))
}

/// POST /v1/hotel/reservations/:id/cancel
/// Compensation: safe to call on missing or already-terminal reservations.
async fn cancel_reservation(
    State(state): State<AppState>,
    Path(reservation_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, AppError> {
    state.hotel.cancel(reservation_id).await?;
    Ok(Json(json!({
        "reservation_id": reservation_id,
        "status": "CANCELLED",
    })))
}
