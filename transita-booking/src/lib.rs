pub mod manager;
pub mod sweeper;

pub use manager::{BookingManager, BookingSummary};
pub use sweeper::{ExpirySweeper, SweepReport};
