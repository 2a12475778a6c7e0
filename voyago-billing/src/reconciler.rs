use tracing::{debug, info, warn};

use voyago_core::PaymentStatus;

use crate::engine::{BillingError, PaymentEngine};

/// Gateway notification types the reconciler acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayEventKind {
    IntentSucceeded,
    IntentFailed,
    ChargeRefunded,
    Unhandled,
}

pub fn classify(event_type: &str) -> GatewayEventKind {
    match event_type {
        "payment_intent.succeeded" => GatewayEventKind::IntentSucceeded,
        "payment_intent.payment_failed" | "payment_intent.canceled" => {
            GatewayEventKind::IntentFailed
        }
        "charge.refunded" => GatewayEventKind::ChargeRefunded,
        _ => GatewayEventKind::Unhandled,
    }
}

/// Drive local Payment state from an asynchronous gateway notification.
///
/// This is the same set-status + emission logic as the synchronous path, so
/// the two may race in any order: status writes are idempotent sets, and
/// duplicate emission is tolerated by the at-least-once consumer contract.
pub async fn reconcile(
    engine: &PaymentEngine,
    event_type: &str,
    payment_intent_id: &str,
) -> Result<(), BillingError> {
    match classify(event_type) {
        GatewayEventKind::IntentSucceeded => {
            match engine
                .update_status_by_intent(payment_intent_id, PaymentStatus::Succeeded)
                .await?
            {
                Some(payment) => {
                    engine.emit_success_events(&payment).await;
                    info!(intent_id = %payment_intent_id, "payment reconciled as succeeded");
                }
                None => warn!(intent_id = %payment_intent_id, "webhook for unknown intent"),
            }
        }
        GatewayEventKind::IntentFailed => {
            match engine
                .update_status_by_intent(payment_intent_id, PaymentStatus::Failed)
                .await?
            {
                Some(payment) => {
                    engine.emit_failure_event(&payment).await;
                    info!(intent_id = %payment_intent_id, "payment reconciled as failed");
                }
                None => warn!(intent_id = %payment_intent_id, "webhook for unknown intent"),
            }
        }
        GatewayEventKind::ChargeRefunded => {
            if engine
                .update_status_by_intent(payment_intent_id, PaymentStatus::Refunded)
                .await?
                .is_none()
            {
                warn!(intent_id = %payment_intent_id, "refund webhook for unknown intent");
            }
        }
        GatewayEventKind::Unhandled => {
            debug!(event_type, "ignoring unhandled gateway event");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_event_types_classify() {
        assert_eq!(
            classify("payment_intent.succeeded"),
            GatewayEventKind::IntentSucceeded
        );
        assert_eq!(
            classify("payment_intent.payment_failed"),
            GatewayEventKind::IntentFailed
        );
        assert_eq!(
            classify("payment_intent.canceled"),
            GatewayEventKind::IntentFailed
        );
        assert_eq!(classify("charge.refunded"), GatewayEventKind::ChargeRefunded);
    }

    #[test]
    fn unknown_event_types_are_ignored() {
        assert_eq!(classify("customer.created"), GatewayEventKind::Unhandled);
        assert_eq!(classify(""), GatewayEventKind::Unhandled);
    }
}
