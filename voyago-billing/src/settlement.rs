use std::sync::Arc;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::{error, info};
use uuid::Uuid;

use crate::engine::PaymentEngine;

/// A mock-mode continuation: mark the payment succeeded and run the
/// success-event path, the way a real gateway's asynchronous confirmation
/// would.
#[derive(Debug, Clone)]
pub struct SettlementJob {
    pub payment_id: Uuid,
    pub gateway_intent_id: String,
    pub booking_id: Uuid,
}

pub fn settlement_channel() -> (UnboundedSender<SettlementJob>, UnboundedReceiver<SettlementJob>) {
    unbounded_channel()
}

/// Drains settlement jobs off the queue. An explicit task with an explicit
/// queue rather than detached fire-and-forget futures: it survives the
/// originating request's lifetime and shuts down cleanly when the sender
/// side is dropped.
pub struct SettlementWorker {
    engine: Arc<PaymentEngine>,
    rx: UnboundedReceiver<SettlementJob>,
}

impl SettlementWorker {
    pub fn new(engine: Arc<PaymentEngine>, rx: UnboundedReceiver<SettlementJob>) -> Self {
        Self { engine, rx }
    }

    pub async fn run(mut self) {
        info!("settlement worker started");
        while let Some(job) = self.rx.recv().await {
            if let Err(e) = self.engine.settle(&job).await {
                error!(
                    payment_id = %job.payment_id,
                    intent_id = %job.gateway_intent_id,
                    error = %e,
                    "mock settlement failed"
                );
            }
        }
        info!("settlement channel closed, worker exiting");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn jobs_flow_through_the_channel_in_order() {
        let (tx, mut rx) = settlement_channel();

        let first = SettlementJob {
            payment_id: Uuid::new_v4(),
            gateway_intent_id: "pi_1".to_string(),
            booking_id: Uuid::new_v4(),
        };
        let second = SettlementJob {
            payment_id: Uuid::new_v4(),
            gateway_intent_id: "pi_2".to_string(),
            booking_id: Uuid::new_v4(),
        };

        tx.send(first.clone()).unwrap();
        tx.send(second.clone()).unwrap();
        drop(tx);

        assert_eq!(rx.recv().await.unwrap().payment_id, first.payment_id);
        assert_eq!(rx.recv().await.unwrap().payment_id, second.payment_id);
        assert!(rx.recv().await.is_none());
    }
}
