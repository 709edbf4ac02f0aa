pub mod ledger;
pub mod reservation;

pub use ledger::SeatLedger;
pub use reservation::{Hold, ReservationManager};
