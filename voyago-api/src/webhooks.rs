use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info};

use voyago_billing::reconciler;

use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct GatewayWebhook {
    pub id: String,
    #[serde(rename = "type")]
    pub type_: String,
    pub data: WebhookData,
}

#[derive(Debug, Deserialize)]
pub struct WebhookData {
    pub object: WebhookObject,
}

#[derive(Debug, Deserialize)]
pub struct WebhookObject {
    pub id: String,
    pub status: Option<String>,
    /// Charge events reference their intent here; intent events carry the
    /// intent id in `id` directly.
    pub payment_intent: Option<String>,
}

/// POST /v1/webhooks/payments
/// Asynchronous gateway notifications. Authenticated against a shared
/// secret, then acknowledged with a fixed body regardless of internal
/// processing outcome so the gateway does not retry forever on transient
/// internal errors.
pub async fn handle_gateway_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<GatewayWebhook>,
) -> Response {
    let provided = headers
        .get("X-Webhook-Secret")
        .and_then(|value| value.to_str().ok());

    if provided != Some(state.webhook_secret.as_str()) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": "invalid webhook secret"})),
        )
            .into_response();
    }

    info!(
        "Received webhook {} ({}) for object {}",
        payload.id, payload.type_, payload.data.object.id
    );

    let intent_id = payload
        .data
        .object
        .payment_intent
        .as_deref()
        .unwrap_or(payload.data.object.id.as_str());

    if let Err(e) = reconciler::reconcile(&state.billing, &payload.type_, intent_id).await {
        error!(
            webhook_id = %payload.id,
            intent_id,
            error = %e,
            "webhook reconciliation failed, acknowledging anyway"
        );
    }

    Json(json!({"received": true})).into_response()
}
