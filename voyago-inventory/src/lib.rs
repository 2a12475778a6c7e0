pub mod ledger;
pub mod manager;
pub mod sweeper;

pub use ledger::{InventoryError, RentalCarLedger, ResourceLedger, RoomTypeLedger};
pub use manager::{CancelOutcome, ReservationManager};
pub use sweeper::ExpirySweeper;
