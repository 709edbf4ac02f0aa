use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use transita_core::ids::new_booking_ref;
use transita_core::seat::dedupe_seat_numbers;
use transita_core::{
    Booking, BookingError, BookingStatus, BookingStore, LedgerError, PaymentStatus,
    ScheduleDirectory,
};
use transita_ledger::SeatLedger;

/// Read-only projection of a booking for listings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingSummary {
    pub booking_ref: String,
    pub bus_id: Uuid,
    pub schedule_id: Uuid,
    pub seat_numbers: Vec<String>,
    pub fare_total: i64,
    pub currency: String,
    pub status: BookingStatus,
    pub payment_status: PaymentStatus,
    pub created_at: DateTime<Utc>,
}

impl From<Booking> for BookingSummary {
    fn from(b: Booking) -> Self {
        Self {
            booking_ref: b.booking_ref,
            bus_id: b.bus_id,
            schedule_id: b.schedule_id,
            seat_numbers: b.seat_numbers,
            fare_total: b.fare_total,
            currency: b.currency,
            status: b.status,
            payment_status: b.payment_status,
            created_at: b.created_at,
        }
    }
}

/// Drives the booking state machine: confirm, payment updates, full and
/// partial cancellation. Seat occupancy is never touched directly; every
/// seat mutation goes through the [`SeatLedger`].
pub struct BookingManager {
    ledger: Arc<SeatLedger>,
    bookings: Arc<dyn BookingStore>,
    schedules: Arc<dyn ScheduleDirectory>,
    booking_fee: i64,
}

impl BookingManager {
    pub fn new(
        ledger: Arc<SeatLedger>,
        bookings: Arc<dyn BookingStore>,
        schedules: Arc<dyn ScheduleDirectory>,
        booking_fee: i64,
    ) -> Self {
        Self {
            ledger,
            bookings,
            schedules,
            booking_fee,
        }
    }

    /// Convert a seat selection into a confirmed booking with payment
    /// pending. The selection is re-validated against the layout and booked
    /// through the ledger's conditional write, so client-held hold state is
    /// never trusted. On a seat conflict nothing is written.
    pub async fn confirm(
        &self,
        bus_id: Uuid,
        schedule_id: Uuid,
        seat_numbers: &[String],
        user_id: &str,
    ) -> Result<Booking, BookingError> {
        if seat_numbers.is_empty() {
            return Err(LedgerError::EmptySelection.into());
        }
        let seat_numbers = dedupe_seat_numbers(seat_numbers);

        let layout = self
            .schedules
            .seat_layout(bus_id, schedule_id)
            .await?
            .ok_or_else(|| LedgerError::ScheduleNotFound {
                bus_id: bus_id.to_string(),
                schedule_id: schedule_id.to_string(),
            })?;

        let unknown: Vec<String> = seat_numbers
            .iter()
            .filter(|sn| !layout.seat_numbers.contains(sn))
            .cloned()
            .collect();
        if !unknown.is_empty() {
            return Err(LedgerError::InvalidSeat(unknown).into());
        }

        // All-or-nothing: on conflict nothing below runs.
        self.ledger
            .book_seats(bus_id, schedule_id, &seat_numbers)
            .await?;

        let fare_total = layout.fare_per_seat * seat_numbers.len() as i64 + self.booking_fee;
        let booking = Booking::new(
            new_booking_ref(),
            user_id.to_string(),
            bus_id,
            schedule_id,
            seat_numbers.clone(),
            fare_total,
            layout.currency.clone(),
        );

        if let Err(e) = self.bookings.insert(&booking).await {
            // Seats were just booked; hand them back before surfacing the
            // failure so the ledger and booking records stay consistent.
            if let Err(release_err) = self
                .ledger
                .release_seats(bus_id, schedule_id, &seat_numbers)
                .await
            {
                warn!(error = %release_err, "failed to release seats after insert failure");
            }
            return Err(e);
        }

        info!(
            booking_ref = %booking.booking_ref, user_id,
            seats = ?booking.seat_numbers, fare = booking.fare_total,
            "booking confirmed"
        );
        Ok(booking)
    }

    /// Update the payment status. The value is domain-validated before any
    /// write; setting the current status again is a no-op success. Seat
    /// occupancy is untouched: a FAILED payment keeps its seats until an
    /// explicit cancellation or the expiry sweep acts.
    pub async fn update_payment(
        &self,
        booking_ref: &str,
        status: &str,
    ) -> Result<Booking, BookingError> {
        let status = PaymentStatus::parse(status)?;
        let booking = self.bookings.set_payment_status(booking_ref, status).await?;
        info!(booking_ref, payment_status = status.as_str(), "payment status updated");
        Ok(booking)
    }

    /// Cancel the booking and release every seat it holds. Idempotent:
    /// cancelling twice succeeds and leaves the same end state.
    pub async fn cancel(&self, booking_ref: &str) -> Result<Booking, BookingError> {
        let booking = self.bookings.mark_cancelled(booking_ref).await?;
        self.ledger
            .release_seats(booking.bus_id, booking.schedule_id, &booking.seat_numbers)
            .await?;
        info!(booking_ref, seats = ?booking.seat_numbers, "booking cancelled");
        Ok(booking)
    }

    /// Cancel part of a booking. The named seats must belong to it; they are
    /// released and the fare recomputed. Emptying the seat set cancels the
    /// whole booking. Ownership and the remaining set are resolved by the
    /// store's conditional write, so concurrent removals on one booking
    /// cannot resurrect each other's seats.
    pub async fn cancel_seats(
        &self,
        booking_ref: &str,
        seat_numbers: &[String],
    ) -> Result<Booking, BookingError> {
        if seat_numbers.is_empty() {
            return Err(LedgerError::EmptySelection.into());
        }
        let seat_numbers = dedupe_seat_numbers(seat_numbers);

        // The booking is only read here for its trip ids; every check that
        // guards the write happens inside `remove_seats`.
        let booking = self
            .bookings
            .fetch(booking_ref)
            .await?
            .ok_or_else(|| BookingError::NotFound(booking_ref.to_string()))?;

        let layout = self
            .schedules
            .seat_layout(booking.bus_id, booking.schedule_id)
            .await?
            .ok_or_else(|| LedgerError::ScheduleNotFound {
                bus_id: booking.bus_id.to_string(),
                schedule_id: booking.schedule_id.to_string(),
            })?;

        let updated = self
            .bookings
            .remove_seats(
                booking_ref,
                &seat_numbers,
                layout.fare_per_seat,
                self.booking_fee,
            )
            .await?;
        self.ledger
            .release_seats(booking.bus_id, booking.schedule_id, &seat_numbers)
            .await?;

        info!(
            booking_ref, released = ?seat_numbers, remaining = ?updated.seat_numbers,
            "seats cancelled"
        );
        Ok(updated)
    }

    pub async fn fetch(&self, booking_ref: &str) -> Result<Option<Booking>, BookingError> {
        self.bookings.fetch(booking_ref).await
    }

    /// A user's bookings, newest first.
    pub async fn summary(&self, user_id: &str) -> Result<Vec<BookingSummary>, BookingError> {
        let bookings = self.bookings.list_for_user(user_id).await?;
        Ok(bookings.into_iter().map(BookingSummary::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::broadcast;
    use transita_core::{BusLayout, SeatState, SeatStore};
    use transita_store::{MemoryBookingStore, MemoryScheduleDirectory, MemorySeatStore};

    fn seat_names(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    struct Fixture {
        manager: Arc<BookingManager>,
        seat_store: Arc<MemorySeatStore>,
        bus: Uuid,
        schedule: Uuid,
    }

    async fn setup(seats: &[&str], fare: i64, fee: i64) -> Fixture {
        let seat_store = Arc::new(MemorySeatStore::new());
        let booking_store = Arc::new(MemoryBookingStore::new());
        let schedules = Arc::new(MemoryScheduleDirectory::new());
        let bus = Uuid::new_v4();
        let schedule = Uuid::new_v4();

        let layout = BusLayout {
            seat_numbers: seat_names(seats),
            fare_per_seat: fare,
            currency: "USD".to_string(),
        };
        schedules.insert_schedule(bus, schedule, layout.clone()).await;
        seat_store
            .seed_seats(bus, schedule, &layout.seat_numbers)
            .await
            .unwrap();

        let (tx, _) = broadcast::channel(16);
        let ledger = Arc::new(SeatLedger::new(seat_store.clone(), tx));
        let manager = Arc::new(BookingManager::new(ledger, booking_store, schedules, fee));

        Fixture {
            manager,
            seat_store,
            bus,
            schedule,
        }
    }

    async fn seat_state(f: &Fixture, seat: &str) -> SeatState {
        let seats = f.seat_store.list_seats(f.bus, f.schedule).await.unwrap();
        seats
            .iter()
            .find(|s| s.seat_number == seat)
            .unwrap()
            .state_at(Utc::now())
    }

    #[tokio::test]
    async fn test_confirm_books_seats_and_computes_fare() {
        let f = setup(&["1", "2", "3"], 1200, 150).await;

        let booking = f
            .manager
            .confirm(f.bus, f.schedule, &seat_names(&["1", "2"]), "user-x")
            .await
            .unwrap();

        assert!(booking.booking_ref.starts_with("BRB-"));
        assert_eq!(booking.status, BookingStatus::Confirmed);
        assert_eq!(booking.payment_status, PaymentStatus::Pending);
        assert_eq!(booking.fare_total, 1200 * 2 + 150);
        assert_eq!(seat_state(&f, "1").await, SeatState::Booked);
        assert_eq!(seat_state(&f, "2").await, SeatState::Booked);
        assert_eq!(seat_state(&f, "3").await, SeatState::Available);
    }

    #[tokio::test]
    async fn test_confirm_is_all_or_nothing_on_conflict() {
        let f = setup(&["A", "B"], 1000, 0).await;
        f.manager
            .confirm(f.bus, f.schedule, &seat_names(&["B"]), "user-x")
            .await
            .unwrap();

        let err = f
            .manager
            .confirm(f.bus, f.schedule, &seat_names(&["A", "B"]), "user-y")
            .await
            .unwrap_err();
        assert_eq!(
            err,
            BookingError::Ledger(LedgerError::SeatUnavailable(seat_names(&["B"])))
        );
        // Seat A was not booked by the failed call.
        assert_eq!(seat_state(&f, "A").await, SeatState::Available);
    }

    #[tokio::test]
    async fn test_confirm_rejects_unknown_seats() {
        let f = setup(&["1"], 1000, 0).await;
        let err = f
            .manager
            .confirm(f.bus, f.schedule, &seat_names(&["1", "99"]), "user-x")
            .await
            .unwrap_err();
        assert_eq!(
            err,
            BookingError::Ledger(LedgerError::InvalidSeat(seat_names(&["99"])))
        );
        assert_eq!(seat_state(&f, "1").await, SeatState::Available);
    }

    #[tokio::test]
    async fn test_payment_update_and_idempotence() {
        let f = setup(&["1"], 1000, 0).await;
        let booking = f
            .manager
            .confirm(f.bus, f.schedule, &seat_names(&["1"]), "user-x")
            .await
            .unwrap();

        let paid = f
            .manager
            .update_payment(&booking.booking_ref, "paid")
            .await
            .unwrap();
        assert_eq!(paid.payment_status, PaymentStatus::Paid);

        // Same status again is a no-op success.
        let again = f
            .manager
            .update_payment(&booking.booking_ref, "PAID")
            .await
            .unwrap();
        assert_eq!(again.payment_status, PaymentStatus::Paid);
        // Seats stay booked.
        assert_eq!(seat_state(&f, "1").await, SeatState::Booked);
    }

    #[tokio::test]
    async fn test_payment_update_rejects_out_of_domain_value() {
        let f = setup(&["1"], 1000, 0).await;
        let booking = f
            .manager
            .confirm(f.bus, f.schedule, &seat_names(&["1"]), "user-x")
            .await
            .unwrap();

        let err = f
            .manager
            .update_payment(&booking.booking_ref, "refunded")
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::InvalidPaymentStatus(_)));
    }

    #[tokio::test]
    async fn test_failed_payment_keeps_seats_booked() {
        let f = setup(&["1"], 1000, 0).await;
        let booking = f
            .manager
            .confirm(f.bus, f.schedule, &seat_names(&["1"]), "user-x")
            .await
            .unwrap();

        f.manager
            .update_payment(&booking.booking_ref, "failed")
            .await
            .unwrap();
        // No auto-release on failure; only cancel or the sweep frees seats.
        assert_eq!(seat_state(&f, "1").await, SeatState::Booked);
    }

    #[tokio::test]
    async fn test_cancel_releases_seats_and_is_idempotent() {
        let f = setup(&["1", "2"], 1000, 0).await;
        let booking = f
            .manager
            .confirm(f.bus, f.schedule, &seat_names(&["1", "2"]), "user-x")
            .await
            .unwrap();

        let cancelled = f.manager.cancel(&booking.booking_ref).await.unwrap();
        assert_eq!(cancelled.status, BookingStatus::Cancelled);
        assert_eq!(seat_state(&f, "1").await, SeatState::Available);

        // Second cancel: same end state, no error.
        let again = f.manager.cancel(&booking.booking_ref).await.unwrap();
        assert_eq!(again.status, BookingStatus::Cancelled);
        assert_eq!(seat_state(&f, "2").await, SeatState::Available);
    }

    #[tokio::test]
    async fn test_cancel_unknown_booking() {
        let f = setup(&["1"], 1000, 0).await;
        let err = f.manager.cancel("BRB-MISSING1").await.unwrap_err();
        assert!(matches!(err, BookingError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_partial_cancel_releases_only_named_seats() {
        let f = setup(&["1", "2", "3"], 1000, 100).await;
        let booking = f
            .manager
            .confirm(f.bus, f.schedule, &seat_names(&["1", "2", "3"]), "user-x")
            .await
            .unwrap();

        let updated = f
            .manager
            .cancel_seats(&booking.booking_ref, &seat_names(&["2"]))
            .await
            .unwrap();

        assert_eq!(updated.seat_numbers, seat_names(&["1", "3"]));
        assert_eq!(updated.fare_total, 1000 * 2 + 100);
        assert_eq!(updated.status, BookingStatus::Confirmed);
        assert_eq!(seat_state(&f, "2").await, SeatState::Available);
        assert_eq!(seat_state(&f, "1").await, SeatState::Booked);
    }

    #[tokio::test]
    async fn test_partial_cancel_of_all_seats_cancels_booking() {
        let f = setup(&["1", "2"], 1000, 0).await;
        let booking = f
            .manager
            .confirm(f.bus, f.schedule, &seat_names(&["1", "2"]), "user-x")
            .await
            .unwrap();

        let updated = f
            .manager
            .cancel_seats(&booking.booking_ref, &seat_names(&["1", "2"]))
            .await
            .unwrap();
        assert_eq!(updated.status, BookingStatus::Cancelled);
        assert_eq!(seat_state(&f, "1").await, SeatState::Available);
        assert_eq!(seat_state(&f, "2").await, SeatState::Available);
    }

    #[tokio::test]
    async fn test_concurrent_partial_cancels_leave_ledger_consistent() {
        let f = setup(&["1", "2", "3"], 1000, 100).await;
        let booking = f
            .manager
            .confirm(f.bus, f.schedule, &seat_names(&["1", "2", "3"]), "user-x")
            .await
            .unwrap();

        let first = {
            let manager = f.manager.clone();
            let booking_ref = booking.booking_ref.clone();
            tokio::spawn(async move { manager.cancel_seats(&booking_ref, &seat_names(&["1"])).await })
        };
        let second = {
            let manager = f.manager.clone();
            let booking_ref = booking.booking_ref.clone();
            tokio::spawn(async move { manager.cancel_seats(&booking_ref, &seat_names(&["2"])).await })
        };
        first.await.unwrap().unwrap();
        second.await.unwrap().unwrap();

        // Neither removal may resurrect the other's seat: the booking ends
        // up with exactly seat 3, and the ledger agrees seat for seat.
        let fetched = f.manager.fetch(&booking.booking_ref).await.unwrap().unwrap();
        assert_eq!(fetched.seat_numbers, seat_names(&["3"]));
        assert_eq!(fetched.fare_total, 1000 + 100);
        assert_eq!(fetched.status, BookingStatus::Confirmed);
        assert_eq!(seat_state(&f, "1").await, SeatState::Available);
        assert_eq!(seat_state(&f, "2").await, SeatState::Available);
        assert_eq!(seat_state(&f, "3").await, SeatState::Booked);
    }

    #[tokio::test]
    async fn test_partial_cancel_rejects_foreign_seats() {
        let f = setup(&["1", "2", "3"], 1000, 0).await;
        let booking = f
            .manager
            .confirm(f.bus, f.schedule, &seat_names(&["1"]), "user-x")
            .await
            .unwrap();

        let err = f
            .manager
            .cancel_seats(&booking.booking_ref, &seat_names(&["2"]))
            .await
            .unwrap_err();
        assert_eq!(err, BookingError::SeatNotInBooking(seat_names(&["2"])));
        // Nothing changed.
        let fetched = f.manager.fetch(&booking.booking_ref).await.unwrap().unwrap();
        assert_eq!(fetched.seat_numbers, seat_names(&["1"]));
    }

    #[tokio::test]
    async fn test_summary_lists_user_bookings() {
        let f = setup(&["1", "2"], 1000, 0).await;
        f.manager
            .confirm(f.bus, f.schedule, &seat_names(&["1"]), "user-x")
            .await
            .unwrap();
        f.manager
            .confirm(f.bus, f.schedule, &seat_names(&["2"]), "user-y")
            .await
            .unwrap();

        let summaries = f.manager.summary("user-x").await.unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].seat_numbers, seat_names(&["1"]));
    }
}
