use std::sync::Arc;

use voyago_billing::PaymentEngine;
use voyago_inventory::ReservationManager;

/// Shared clients and engines, built once at startup and injected
/// everywhere. No ambient singletons.
#[derive(Clone)]
pub struct AppState {
    pub hotel: Arc<ReservationManager>,
    pub cars: Arc<ReservationManager>,
    pub billing: Arc<PaymentEngine>,
    pub webhook_secret: String,
}
