use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use voyago_billing::{CreateIntentOutcome, CreateIntentRequest, PaymentFilter};
use voyago_core::{Payment, PaymentStatus};

use crate::error::AppError;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/payments/intent", post(create_payment_intent))
        .route("/v1/payments/confirm", post(confirm_payment))
        .route("/v1/payments/{id}/refund", post(refund_payment))
        .route("/v1/payments/{id}", get(get_payment))
        .route("/v1/payments", get(list_payments))
}

/// POST /v1/payments/intent
/// Create a payment intent. An `Idempotency-Key` header makes retries of
/// the same request replay the original response instead of charging twice.
async fn create_payment_intent(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CreateIntentRequest>,
) -> Result<Response, AppError> {
    let idempotency_key = headers
        .get("Idempotency-Key")
        .and_then(|value| value.to_str().ok());

    match state.billing.create_intent(idempotency_key, req).await? {
        CreateIntentOutcome::Created(response) => {
            Ok((StatusCode::CREATED, Json(response)).into_response())
        }
        // Replays carry the original success status.
        CreateIntentOutcome::Replayed(stored) => {
            Ok((StatusCode::CREATED, Json(stored)).into_response())
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ConfirmPaymentRequest {
    pub payment_intent_id: String,
    pub payment_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct ConfirmPaymentResponse {
    pub payment_intent_id: String,
    pub gateway_status: String,
    pub status: PaymentStatus,
    pub payment: Option<Payment>,
}

/// POST /v1/payments/confirm
/// Reconcile local state against the gateway's view of an intent.
async fn confirm_payment(
    State(state): State<AppState>,
    Json(req): Json<ConfirmPaymentRequest>,
) -> Result<Json<ConfirmPaymentResponse>, AppError> {
    let outcome = state
        .billing
        .confirm_payment(&req.payment_intent_id, req.payment_id)
        .await?;

    Ok(Json(ConfirmPaymentResponse {
        payment_intent_id: req.payment_intent_id,
        gateway_status: outcome.gateway_status,
        status: outcome.status,
        payment: outcome.payment,
    }))
}

#[derive(Debug, Deserialize)]
pub struct RefundPaymentRequest {
    pub reason: Option<String>,
}

/// POST /v1/payments/:id/refund
async fn refund_payment(
    State(state): State<AppState>,
    Path(payment_id): Path<Uuid>,
    Json(req): Json<RefundPaymentRequest>,
) -> Result<Json<Payment>, AppError> {
    let payment = state
        .billing
        .refund_payment(payment_id, req.reason.as_deref())
        .await?;
    Ok(Json(payment))
}

/// GET /v1/payments/:id
async fn get_payment(
    State(state): State<AppState>,
    Path(payment_id): Path<Uuid>,
) -> Result<Json<Payment>, AppError> {
    let payment = state.billing.get_payment(payment_id).await?;
    Ok(Json(payment))
}

/// GET /v1/payments?user_id=&booking_id=&status=&page=&per_page=
async fn list_payments(
    State(state): State<AppState>,
    Query(filter): Query<PaymentFilter>,
) -> Result<Json<Vec<Payment>>, AppError> {
    let payments = state.billing.list_payments(&filter).await?;
    Ok(Json(payments))
}
