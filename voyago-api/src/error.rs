use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use uuid::Uuid;

use voyago_billing::BillingError;
use voyago_inventory::InventoryError;

#[derive(Debug)]
pub enum AppError {
    Validation(String),
    NotFound(String),
    IdempotencyConflict,
    InsufficientInventory(String),
    Gateway(String),
    Internal(String),
    Anyhow(anyhow::Error),
}

impl AppError {
    fn status_and_code(&self) -> (StatusCode, &'static str, String) {
        match self {
            AppError::Validation(msg) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            AppError::IdempotencyConflict => (
                StatusCode::CONFLICT,
                "IDEMPOTENCY_CONFLICT",
                "a request with this idempotency key is still processing".to_string(),
            ),
            AppError::InsufficientInventory(msg) => {
                (StatusCode::CONFLICT, "INSUFFICIENT_INVENTORY", msg.clone())
            }
            AppError::Gateway(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "GATEWAY_ERROR", msg.clone())
            }
            AppError::Internal(_) | AppError::Anyhow(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "internal server error".to_string(),
            ),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let trace_id = Uuid::new_v4();
        let (status, code, message) = self.status_and_code();

        if status.is_server_error() {
            match &self {
                AppError::Internal(msg) => {
                    tracing::error!(%trace_id, "Internal Server Error: {}", msg)
                }
                AppError::Anyhow(err) => {
                    tracing::error!(%trace_id, "Internal Server Error: {}", err)
                }
                AppError::Gateway(msg) => tracing::error!(%trace_id, "Gateway error: {}", msg),
                _ => {}
            }
        }

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message,
                "trace_id": trace_id,
            }
        }));

        (status, body).into_response()
    }
}

impl From<InventoryError> for AppError {
    fn from(err: InventoryError) -> Self {
        match err {
            InventoryError::NotFound(msg) => AppError::NotFound(msg),
            InventoryError::InsufficientInventory { .. } => {
                AppError::InsufficientInventory(err.to_string())
            }
            InventoryError::Validation(msg) => AppError::Validation(msg),
            InventoryError::CorruptRow(msg) => AppError::Internal(msg),
            InventoryError::Database(e) => AppError::Internal(e.to_string()),
        }
    }
}

impl From<BillingError> for AppError {
    fn from(err: BillingError) -> Self {
        match err {
            BillingError::Validation(msg) => AppError::Validation(msg),
            BillingError::NotFound(msg) => AppError::NotFound(msg),
            BillingError::IdempotencyConflict => AppError::IdempotencyConflict,
            BillingError::Gateway(e) => AppError::Gateway(e.to_string()),
            BillingError::Database(e) => AppError::Internal(e.to_string()),
            BillingError::Internal(msg) => AppError::Internal(msg),
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::Anyhow(err)
    }
}
