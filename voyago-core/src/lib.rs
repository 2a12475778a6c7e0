pub mod events;
pub mod payment;
pub mod reservation;

pub use events::EventSink;
pub use payment::{GatewayError, GatewayIntent, Payment, PaymentGateway, PaymentStatus};
pub use reservation::{Reservation, ReservationStatus, ResourceKind};
