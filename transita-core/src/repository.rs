use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::booking::{Booking, PaymentStatus};
use crate::error::{BookingError, LedgerError};
use crate::seat::Seat;

/// Read-only reference data for one (bus, schedule) pair: which seats exist
/// and what they cost. Owned by the scheduling side of the platform; the
/// booking core only reads it.
#[derive(Debug, Clone)]
pub struct BusLayout {
    pub seat_numbers: Vec<String>,
    pub fare_per_seat: i64,
    pub currency: String,
}

#[async_trait]
pub trait ScheduleDirectory: Send + Sync {
    async fn seat_layout(
        &self,
        bus_id: Uuid,
        schedule_id: Uuid,
    ) -> Result<Option<BusLayout>, LedgerError>;
}

/// Authoritative seat-occupancy store for (bus, schedule) pairs.
///
/// `hold_seats` and `book_seats` are conditional writes: the availability
/// precondition is evaluated at write time, under whatever exclusion the
/// implementation provides, so two concurrent claims on the same seat cannot
/// both succeed. Every occupancy mutation in the system funnels through this
/// trait.
#[async_trait]
pub trait SeatStore: Send + Sync {
    /// Create one row per seat position when a schedule opens for sale.
    /// Existing seats are left untouched.
    async fn seed_seats(
        &self,
        bus_id: Uuid,
        schedule_id: Uuid,
        seat_numbers: &[String],
    ) -> Result<(), LedgerError>;

    async fn list_seats(&self, bus_id: Uuid, schedule_id: Uuid)
        -> Result<Vec<Seat>, LedgerError>;

    /// Place a hold on every listed seat, all-or-nothing. Fails with
    /// `SeatUnavailable` naming each seat that is booked or under a live hold.
    /// Lapsed holds count as available.
    async fn hold_seats(
        &self,
        bus_id: Uuid,
        schedule_id: Uuid,
        seat_numbers: &[String],
        holder: &str,
        until: DateTime<Utc>,
    ) -> Result<(), LedgerError>;

    /// Transition held or available seats to booked, clearing any hold,
    /// all-or-nothing. Fails with `SeatUnavailable` if any seat is already
    /// booked.
    async fn book_seats(
        &self,
        bus_id: Uuid,
        schedule_id: Uuid,
        seat_numbers: &[String],
    ) -> Result<(), LedgerError>;

    /// Clear occupancy and hold unconditionally. Idempotent.
    async fn release_seats(
        &self,
        bus_id: Uuid,
        schedule_id: Uuid,
        seat_numbers: &[String],
    ) -> Result<(), LedgerError>;
}

/// Persistence for booking records. Bookings are closed, never deleted.
#[async_trait]
pub trait BookingStore: Send + Sync {
    async fn insert(&self, booking: &Booking) -> Result<(), BookingError>;

    async fn fetch(&self, booking_ref: &str) -> Result<Option<Booking>, BookingError>;

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<Booking>, BookingError>;

    /// Set the payment status, conditional on the booking still being
    /// CONFIRMED at write time. A cancelled booking rejects the update.
    async fn set_payment_status(
        &self,
        booking_ref: &str,
        status: PaymentStatus,
    ) -> Result<Booking, BookingError>;

    /// Mark the booking cancelled and return it (seat set included, so the
    /// caller can release). Already-cancelled bookings are returned as-is.
    async fn mark_cancelled(&self, booking_ref: &str) -> Result<Booking, BookingError>;

    /// Sweep path: cancel only if the booking is still CONFIRMED with payment
    /// PENDING at write time. Returns `None` when the precondition no longer
    /// holds, which is how a just-paid booking escapes the sweep.
    async fn cancel_if_payment_pending(
        &self,
        booking_ref: &str,
    ) -> Result<Option<Booking>, BookingError>;

    /// Remove the listed seats from the booking and recompute the fare as
    /// `fare_per_seat * remaining + booking_fee`. Conditional write: the
    /// booking must still be CONFIRMED and own every listed seat at write
    /// time, and the remaining set is computed under the same exclusion, so
    /// two concurrent removals cannot resurrect each other's seats. Removing
    /// every remaining seat cancels the booking, leaving its recorded seat
    /// set and fare intact as with an explicit cancellation.
    async fn remove_seats(
        &self,
        booking_ref: &str,
        seat_numbers: &[String],
        fare_per_seat: i64,
        booking_fee: i64,
    ) -> Result<Booking, BookingError>;

    /// Bookings still CONFIRMED + PENDING whose `created_at` is at or before
    /// `cutoff`: the sweep's candidate set.
    async fn find_expired_pending(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Booking>, BookingError>;
}
