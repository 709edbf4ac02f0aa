pub mod booking;
pub mod error;
pub mod events;
pub mod ids;
pub mod repository;
pub mod seat;

pub use booking::{Booking, BookingStatus, PaymentStatus};
pub use error::{BookingError, LedgerError};
pub use events::{SeatChange, SeatMapChangedEvent};
pub use repository::{BookingStore, BusLayout, ScheduleDirectory, SeatStore};
pub use seat::{Seat, SeatState};
