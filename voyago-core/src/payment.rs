use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Processing,
    RequiresPaymentMethod,
    Succeeded,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Processing => "PROCESSING",
            PaymentStatus::RequiresPaymentMethod => "REQUIRES_PAYMENT_METHOD",
            PaymentStatus::Succeeded => "SUCCEEDED",
            PaymentStatus::Failed => "FAILED",
            PaymentStatus::Refunded => "REFUNDED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(PaymentStatus::Pending),
            "PROCESSING" => Some(PaymentStatus::Processing),
            "REQUIRES_PAYMENT_METHOD" => Some(PaymentStatus::RequiresPaymentMethod),
            "SUCCEEDED" => Some(PaymentStatus::Succeeded),
            "FAILED" => Some(PaymentStatus::Failed),
            "REFUNDED" => Some(PaymentStatus::Refunded),
            _ => None,
        }
    }
}

/// Fixed mapping from the gateway's status vocabulary to the internal enum.
///
/// Unknown gateway statuses default to PENDING rather than raising, so an
/// unrecognized-but-benign status never corrupts the mapping layer.
pub fn map_gateway_status(gateway_status: &str) -> PaymentStatus {
    match gateway_status {
        "succeeded" => PaymentStatus::Succeeded,
        "processing" => PaymentStatus::Processing,
        "requires_payment_method" | "requires_action" | "requires_confirmation" => {
            PaymentStatus::RequiresPaymentMethod
        }
        "canceled" | "payment_failed" => PaymentStatus::Failed,
        _ => PaymentStatus::Pending,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub user_id: String,
    pub amount_cents: i64,
    pub currency: String,
    pub status: PaymentStatus,
    pub gateway_intent_id: String,
    pub client_secret: Option<String>,
    pub refund_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// What the gateway reports about an intent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayIntent {
    pub id: String,
    pub status: String,
    pub client_secret: Option<String>,
}

#[derive(Debug, Error)]
#[error("payment gateway error: {0}")]
pub struct GatewayError(pub String);

/// External payment processor seam. The engine never holds a database lock
/// across any of these calls.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Create a payment intent for amount/currency, tagged with
    /// booking/user metadata.
    async fn create_intent(
        &self,
        amount_cents: i64,
        currency: &str,
        booking_id: Uuid,
        user_id: &str,
    ) -> Result<GatewayIntent, GatewayError>;

    /// Current gateway-side status for an intent.
    async fn get_intent(&self, intent_id: &str) -> Result<GatewayIntent, GatewayError>;

    /// Refund the charge behind an intent.
    async fn refund_intent(&self, intent_id: &str, reason: Option<&str>)
        -> Result<(), GatewayError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mapping_covers_gateway_vocabulary() {
        assert_eq!(map_gateway_status("succeeded"), PaymentStatus::Succeeded);
        assert_eq!(map_gateway_status("processing"), PaymentStatus::Processing);
        assert_eq!(
            map_gateway_status("requires_payment_method"),
            PaymentStatus::RequiresPaymentMethod
        );
        assert_eq!(
            map_gateway_status("requires_action"),
            PaymentStatus::RequiresPaymentMethod
        );
        assert_eq!(
            map_gateway_status("requires_confirmation"),
            PaymentStatus::RequiresPaymentMethod
        );
        assert_eq!(map_gateway_status("canceled"), PaymentStatus::Failed);
        assert_eq!(map_gateway_status("payment_failed"), PaymentStatus::Failed);
    }

    #[test]
    fn unknown_gateway_status_defaults_to_pending() {
        assert_eq!(map_gateway_status("definitely_new"), PaymentStatus::Pending);
        assert_eq!(map_gateway_status(""), PaymentStatus::Pending);
    }

    #[test]
    fn status_round_trips_through_text() {
        for status in [
            PaymentStatus::Pending,
            PaymentStatus::Processing,
            PaymentStatus::RequiresPaymentMethod,
            PaymentStatus::Succeeded,
            PaymentStatus::Failed,
            PaymentStatus::Refunded,
        ] {
            assert_eq!(PaymentStatus::parse(status.as_str()), Some(status));
        }
    }
}
