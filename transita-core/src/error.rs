use thiserror::Error;

/// Failures raised by the seat ledger and reservation path.
#[derive(Debug, Error, PartialEq)]
pub enum LedgerError {
    /// One or more requested seats are held or booked by someone else. The
    /// offending seat numbers are listed so the client can re-render the map.
    #[error("seats unavailable: {0:?}")]
    SeatUnavailable(Vec<String>),

    /// Seat numbers that do not exist on the bus layout.
    #[error("unknown seats: {0:?}")]
    InvalidSeat(Vec<String>),

    #[error("no seats selected")]
    EmptySelection,

    #[error("schedule not found for bus {bus_id} / schedule {schedule_id}")]
    ScheduleNotFound { bus_id: String, schedule_id: String },

    #[error("seat store error: {0}")]
    Store(String),
}

/// Failures raised by the booking lifecycle.
#[derive(Debug, Error, PartialEq)]
pub enum BookingError {
    #[error("booking not found: {0}")]
    NotFound(String),

    #[error("invalid payment status: {0}")]
    InvalidPaymentStatus(String),

    /// Partial cancellation referenced seats the booking does not own.
    #[error("seats not in booking: {0:?}")]
    SeatNotInBooking(Vec<String>),

    #[error("booking {0} is cancelled")]
    BookingCancelled(String),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("booking store error: {0}")]
    Store(String),
}
