use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Generic payment lifecycle facts, keyed by booking id for partition
/// ordering. Consumed at-least-once by the order aggregator.
pub const PAYMENT_EVENTS_TOPIC: &str = "payment.events";
/// Succeeded-only facts for the notification pipeline.
pub const PAYMENT_CONFIRMATION_TOPIC: &str = "payment-confirmation";

/// Broker seam. Implemented by the Kafka producer in voyago-store and by
/// in-memory fakes in tests.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn publish(
        &self,
        topic: &str,
        key: &str,
        payload: &str,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentSucceededEvent {
    pub event_type: String,
    pub payment_id: Uuid,
    pub booking_id: Uuid,
    pub user_id: String,
    pub amount_cents: i64,
    pub currency: String,
    pub gateway_intent_id: String,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentFailedEvent {
    pub event_type: String,
    pub payment_id: Uuid,
    pub booking_id: Uuid,
    pub gateway_intent_id: String,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentConfirmationEvent {
    pub payment_id: Uuid,
    pub booking_id: Uuid,
    pub user_id: String,
    pub amount_cents: i64,
    pub currency: String,
    pub timestamp: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn succeeded_event_serializes_with_booking_key_fields() {
        let event = PaymentSucceededEvent {
            event_type: "payment.succeeded".to_string(),
            payment_id: Uuid::new_v4(),
            booking_id: Uuid::new_v4(),
            user_id: "user-1".to_string(),
            amount_cents: 4200,
            currency: "EUR".to_string(),
            gateway_intent_id: "pi_123".to_string(),
            timestamp: Utc::now().timestamp(),
        };

        let json: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&event).unwrap()).unwrap();
        assert_eq!(json["event_type"], "payment.succeeded");
        assert_eq!(json["amount_cents"], 4200);
        assert!(json["booking_id"].is_string());
    }
}
