pub mod engine;
pub mod gateway;
pub mod reconciler;
pub mod settlement;

pub use engine::{
    BillingError, BillingPolicy, CreateIntentOutcome, CreateIntentRequest, PaymentEngine,
    PaymentFilter, PaymentIntentResponse,
};
pub use gateway::{MockGateway, StripeGateway};
pub use settlement::{settlement_channel, SettlementJob, SettlementWorker};
