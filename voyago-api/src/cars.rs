use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::error::AppError;
use crate::hotel::ReservationResponse;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateCarReservationRequest {
    pub car_id: Uuid,
    pub booking_id: Uuid,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/car/reservations", post(create_reservation))
        .route("/v1/car/reservations/{id}/confirm", post(confirm_reservation))
        .route("/v1/car/reservations/{id}/cancel", post(cancel_reservation))
}

/// POST /v1/car/reservations
/// Rental cars are single units; quantity is always one.
async fn create_reservation(
    State(state): State<AppState>,
    Json(req): Json<CreateCarReservationRequest>,
) -> Result<(StatusCode, Json<ReservationResponse>), AppError> {
    let reservation = state.cars.create(req.car_id, req.booking_id, 1).await?;
    Ok((StatusCode::CREATED, Json(reservation.into())))
}

/// POST /v1/car/reservations/:id/confirm
async fn confirm_reservation(
    State(state): State<AppState>,
    Path(reservation_id): Path<Uuid>,
) -> Result<Json<ReservationResponse>, AppError> {
    let reservation = state.cars.confirm(reservation_id).await?;
    Ok(Json(reservation.into()))
}

/// POST /v1/car/reservations/:id/cancel
async fn cancel_reservation(
    State(state): State<AppState>,
    Path(reservation_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, AppError> {
    state.cars.cancel(reservation_id).await?;
    Ok(Json(json!({
        "reservation_id": reservation_id,
        "status": "CANCELLED",
    })))
}
