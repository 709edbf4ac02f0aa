//! In-memory implementations of the core stores, used by tests and local
//! development. The conditional-write contract is met by evaluating every
//! precondition and performing the mutation under a single write lock, so
//! concurrent claims on the same seat serialize exactly like the SQL
//! implementations.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;
use uuid::Uuid;

use transita_core::{
    Booking, BookingError, BookingStatus, BookingStore, BusLayout, LedgerError, PaymentStatus,
    ScheduleDirectory, Seat, SeatStore,
};

type TripKey = (Uuid, Uuid); // (bus_id, schedule_id)

#[derive(Default)]
pub struct MemorySeatStore {
    // BTreeMap keeps seat listings in stable seat-number order.
    trips: RwLock<HashMap<TripKey, BTreeMap<String, Seat>>>,
}

impl MemorySeatStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SeatStore for MemorySeatStore {
    async fn seed_seats(
        &self,
        bus_id: Uuid,
        schedule_id: Uuid,
        seat_numbers: &[String],
    ) -> Result<(), LedgerError> {
        let mut trips = self.trips.write().await;
        let seats = trips.entry((bus_id, schedule_id)).or_default();
        for seat_number in seat_numbers {
            seats
                .entry(seat_number.clone())
                .or_insert_with(|| Seat::new(seat_number.clone()));
        }
        Ok(())
    }

    async fn list_seats(
        &self,
        bus_id: Uuid,
        schedule_id: Uuid,
    ) -> Result<Vec<Seat>, LedgerError> {
        let trips = self.trips.read().await;
        let seats = trips.get(&(bus_id, schedule_id)).ok_or_else(|| {
            LedgerError::ScheduleNotFound {
                bus_id: bus_id.to_string(),
                schedule_id: schedule_id.to_string(),
            }
        })?;
        Ok(seats.values().cloned().collect())
    }

    async fn hold_seats(
        &self,
        bus_id: Uuid,
        schedule_id: Uuid,
        seat_numbers: &[String],
        holder: &str,
        until: DateTime<Utc>,
    ) -> Result<(), LedgerError> {
        let mut trips = self.trips.write().await;
        let seats = trips.get_mut(&(bus_id, schedule_id)).ok_or_else(|| {
            LedgerError::ScheduleNotFound {
                bus_id: bus_id.to_string(),
                schedule_id: schedule_id.to_string(),
            }
        })?;

        let now = Utc::now();
        let mut missing = Vec::new();
        let mut conflicts = Vec::new();
        for seat_number in seat_numbers {
            match seats.get(seat_number) {
                None => missing.push(seat_number.clone()),
                Some(seat) if !seat.is_available_at(now) => conflicts.push(seat_number.clone()),
                Some(_) => {}
            }
        }
        if !missing.is_empty() {
            return Err(LedgerError::InvalidSeat(missing));
        }
        if !conflicts.is_empty() {
            return Err(LedgerError::SeatUnavailable(conflicts));
        }

        for seat_number in seat_numbers {
            if let Some(seat) = seats.get_mut(seat_number) {
                seat.reserved_until = Some(until);
                seat.held_by = Some(holder.to_string());
            }
        }
        Ok(())
    }

    async fn book_seats(
        &self,
        bus_id: Uuid,
        schedule_id: Uuid,
        seat_numbers: &[String],
    ) -> Result<(), LedgerError> {
        let mut trips = self.trips.write().await;
        let seats = trips.get_mut(&(bus_id, schedule_id)).ok_or_else(|| {
            LedgerError::ScheduleNotFound {
                bus_id: bus_id.to_string(),
                schedule_id: schedule_id.to_string(),
            }
        })?;

        let mut missing = Vec::new();
        let mut conflicts = Vec::new();
        for seat_number in seat_numbers {
            match seats.get(seat_number) {
                None => missing.push(seat_number.clone()),
                Some(seat) if seat.is_booked => conflicts.push(seat_number.clone()),
                Some(_) => {}
            }
        }
        if !missing.is_empty() {
            return Err(LedgerError::InvalidSeat(missing));
        }
        if !conflicts.is_empty() {
            return Err(LedgerError::SeatUnavailable(conflicts));
        }

        for seat_number in seat_numbers {
            if let Some(seat) = seats.get_mut(seat_number) {
                seat.is_booked = true;
                seat.reserved_until = None;
                seat.held_by = None;
            }
        }
        Ok(())
    }

    async fn release_seats(
        &self,
        bus_id: Uuid,
        schedule_id: Uuid,
        seat_numbers: &[String],
    ) -> Result<(), LedgerError> {
        let mut trips = self.trips.write().await;
        // Releasing against an unknown schedule or seat is a no-op.
        if let Some(seats) = trips.get_mut(&(bus_id, schedule_id)) {
            for seat_number in seat_numbers {
                if let Some(seat) = seats.get_mut(seat_number) {
                    seat.is_booked = false;
                    seat.reserved_until = None;
                    seat.held_by = None;
                }
            }
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryBookingStore {
    bookings: RwLock<HashMap<String, Booking>>,
}

impl MemoryBookingStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BookingStore for MemoryBookingStore {
    async fn insert(&self, booking: &Booking) -> Result<(), BookingError> {
        let mut bookings = self.bookings.write().await;
        if bookings.contains_key(&booking.booking_ref) {
            return Err(BookingError::Store(format!(
                "duplicate booking ref: {}",
                booking.booking_ref
            )));
        }
        bookings.insert(booking.booking_ref.clone(), booking.clone());
        Ok(())
    }

    async fn fetch(&self, booking_ref: &str) -> Result<Option<Booking>, BookingError> {
        let bookings = self.bookings.read().await;
        Ok(bookings.get(booking_ref).cloned())
    }

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<Booking>, BookingError> {
        let bookings = self.bookings.read().await;
        let mut result: Vec<Booking> = bookings
            .values()
            .filter(|b| b.user_id == user_id)
            .cloned()
            .collect();
        result.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(result)
    }

    async fn set_payment_status(
        &self,
        booking_ref: &str,
        status: PaymentStatus,
    ) -> Result<Booking, BookingError> {
        let mut bookings = self.bookings.write().await;
        let booking = bookings
            .get_mut(booking_ref)
            .ok_or_else(|| BookingError::NotFound(booking_ref.to_string()))?;
        if booking.status == BookingStatus::Cancelled {
            return Err(BookingError::BookingCancelled(booking_ref.to_string()));
        }
        if booking.payment_status != status {
            booking.payment_status = status;
            booking.updated_at = Utc::now();
        }
        Ok(booking.clone())
    }

    async fn mark_cancelled(&self, booking_ref: &str) -> Result<Booking, BookingError> {
        let mut bookings = self.bookings.write().await;
        let booking = bookings
            .get_mut(booking_ref)
            .ok_or_else(|| BookingError::NotFound(booking_ref.to_string()))?;
        if booking.status != BookingStatus::Cancelled {
            booking.status = BookingStatus::Cancelled;
            booking.updated_at = Utc::now();
        }
        Ok(booking.clone())
    }

    async fn cancel_if_payment_pending(
        &self,
        booking_ref: &str,
    ) -> Result<Option<Booking>, BookingError> {
        let mut bookings = self.bookings.write().await;
        let booking = bookings
            .get_mut(booking_ref)
            .ok_or_else(|| BookingError::NotFound(booking_ref.to_string()))?;
        if booking.status == BookingStatus::Confirmed
            && booking.payment_status == PaymentStatus::Pending
        {
            booking.status = BookingStatus::Cancelled;
            booking.updated_at = Utc::now();
            Ok(Some(booking.clone()))
        } else {
            Ok(None)
        }
    }

    async fn remove_seats(
        &self,
        booking_ref: &str,
        seat_numbers: &[String],
        fare_per_seat: i64,
        booking_fee: i64,
    ) -> Result<Booking, BookingError> {
        let mut bookings = self.bookings.write().await;
        let booking = bookings
            .get_mut(booking_ref)
            .ok_or_else(|| BookingError::NotFound(booking_ref.to_string()))?;
        if booking.status == BookingStatus::Cancelled {
            return Err(BookingError::BookingCancelled(booking_ref.to_string()));
        }

        // Ownership and the remaining set are both evaluated under this
        // write lock, never from a stale read.
        let not_owned: Vec<String> = seat_numbers
            .iter()
            .filter(|sn| !booking.seat_numbers.contains(sn))
            .cloned()
            .collect();
        if !not_owned.is_empty() {
            return Err(BookingError::SeatNotInBooking(not_owned));
        }

        let remaining: Vec<String> = booking
            .seat_numbers
            .iter()
            .filter(|sn| !seat_numbers.contains(sn))
            .cloned()
            .collect();

        if remaining.is_empty() {
            booking.status = BookingStatus::Cancelled;
        } else {
            booking.fare_total = fare_per_seat * remaining.len() as i64 + booking_fee;
            booking.seat_numbers = remaining;
        }
        booking.updated_at = Utc::now();
        Ok(booking.clone())
    }

    async fn find_expired_pending(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Booking>, BookingError> {
        let bookings = self.bookings.read().await;
        Ok(bookings
            .values()
            .filter(|b| {
                b.status == BookingStatus::Confirmed
                    && b.payment_status == PaymentStatus::Pending
                    && b.created_at <= cutoff
            })
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct MemoryScheduleDirectory {
    layouts: RwLock<HashMap<TripKey, BusLayout>>,
}

impl MemoryScheduleDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_schedule(
        &self,
        bus_id: Uuid,
        schedule_id: Uuid,
        layout: BusLayout,
    ) {
        let mut layouts = self.layouts.write().await;
        layouts.insert((bus_id, schedule_id), layout);
    }
}

#[async_trait]
impl ScheduleDirectory for MemoryScheduleDirectory {
    async fn seat_layout(
        &self,
        bus_id: Uuid,
        schedule_id: Uuid,
    ) -> Result<Option<BusLayout>, LedgerError> {
        let layouts = self.layouts.read().await;
        Ok(layouts.get(&(bus_id, schedule_id)).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn seat_names(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_hold_conflict_lists_only_offending_seats() {
        let store = MemorySeatStore::new();
        let bus = Uuid::new_v4();
        let schedule = Uuid::new_v4();
        store
            .seed_seats(bus, schedule, &seat_names(&["1", "2", "3"]))
            .await
            .unwrap();

        let until = Utc::now() + Duration::minutes(5);
        store
            .hold_seats(bus, schedule, &seat_names(&["1", "2"]), "user-x", until)
            .await
            .unwrap();

        let err = store
            .hold_seats(bus, schedule, &seat_names(&["2", "3"]), "user-y", until)
            .await
            .unwrap_err();
        assert_eq!(err, LedgerError::SeatUnavailable(seat_names(&["2"])));

        // Seat 3 untouched by the failed call.
        let seats = store.list_seats(bus, schedule).await.unwrap();
        let seat3 = seats.iter().find(|s| s.seat_number == "3").unwrap();
        assert!(seat3.is_available_at(Utc::now()));
    }

    #[tokio::test]
    async fn test_expired_hold_is_reclaimable_without_write() {
        let store = MemorySeatStore::new();
        let bus = Uuid::new_v4();
        let schedule = Uuid::new_v4();
        store
            .seed_seats(bus, schedule, &seat_names(&["1"]))
            .await
            .unwrap();

        let past = Utc::now() - Duration::seconds(1);
        store
            .hold_seats(bus, schedule, &seat_names(&["1"]), "user-x", past)
            .await
            .unwrap();

        // No release happened; the lapsed hold simply no longer counts.
        let until = Utc::now() + Duration::minutes(5);
        store
            .hold_seats(bus, schedule, &seat_names(&["1"]), "user-y", until)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_book_all_or_nothing() {
        let store = MemorySeatStore::new();
        let bus = Uuid::new_v4();
        let schedule = Uuid::new_v4();
        store
            .seed_seats(bus, schedule, &seat_names(&["A", "B"]))
            .await
            .unwrap();
        store
            .book_seats(bus, schedule, &seat_names(&["B"]))
            .await
            .unwrap();

        let err = store
            .book_seats(bus, schedule, &seat_names(&["A", "B"]))
            .await
            .unwrap_err();
        assert_eq!(err, LedgerError::SeatUnavailable(seat_names(&["B"])));

        let seats = store.list_seats(bus, schedule).await.unwrap();
        let seat_a = seats.iter().find(|s| s.seat_number == "A").unwrap();
        assert!(!seat_a.is_booked);
    }

    #[tokio::test]
    async fn test_release_is_idempotent() {
        let store = MemorySeatStore::new();
        let bus = Uuid::new_v4();
        let schedule = Uuid::new_v4();
        store
            .seed_seats(bus, schedule, &seat_names(&["A"]))
            .await
            .unwrap();
        store
            .book_seats(bus, schedule, &seat_names(&["A"]))
            .await
            .unwrap();

        store
            .release_seats(bus, schedule, &seat_names(&["A"]))
            .await
            .unwrap();
        store
            .release_seats(bus, schedule, &seat_names(&["A"]))
            .await
            .unwrap();

        let seats = store.list_seats(bus, schedule).await.unwrap();
        assert!(seats[0].is_available_at(Utc::now()));
    }

    #[tokio::test]
    async fn test_concurrent_holds_only_one_wins() {
        use std::sync::Arc;

        let store = Arc::new(MemorySeatStore::new());
        let bus = Uuid::new_v4();
        let schedule = Uuid::new_v4();
        store
            .seed_seats(bus, schedule, &seat_names(&["12"]))
            .await
            .unwrap();

        let until = Utc::now() + Duration::minutes(5);
        let mut handles = Vec::new();
        for i in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .hold_seats(bus, schedule, &seat_names(&["12"]), &format!("user-{i}"), until)
                    .await
            }));
        }

        let mut wins = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                wins += 1;
            }
        }
        assert_eq!(wins, 1);
    }

    #[tokio::test]
    async fn test_sweep_precondition_excludes_paid() {
        let store = MemoryBookingStore::new();
        let booking = Booking::new(
            "BRB-SWEEP001".to_string(),
            "user-1".to_string(),
            Uuid::new_v4(),
            Uuid::new_v4(),
            seat_names(&["1"]),
            1000,
            "USD".to_string(),
        );
        store.insert(&booking).await.unwrap();

        store
            .set_payment_status("BRB-SWEEP001", PaymentStatus::Paid)
            .await
            .unwrap();

        let swept = store
            .cancel_if_payment_pending("BRB-SWEEP001")
            .await
            .unwrap();
        assert!(swept.is_none());

        let fetched = store.fetch("BRB-SWEEP001").await.unwrap().unwrap();
        assert_eq!(fetched.status, BookingStatus::Confirmed);
    }

    #[tokio::test]
    async fn test_remove_seats_resolves_against_current_set() {
        let store = MemoryBookingStore::new();
        let booking = Booking::new(
            "BRB-REMOVE01".to_string(),
            "user-1".to_string(),
            Uuid::new_v4(),
            Uuid::new_v4(),
            seat_names(&["1", "2", "3"]),
            3100,
            "USD".to_string(),
        );
        store.insert(&booking).await.unwrap();

        let updated = store
            .remove_seats("BRB-REMOVE01", &seat_names(&["2"]), 1000, 100)
            .await
            .unwrap();
        assert_eq!(updated.seat_numbers, seat_names(&["1", "3"]));
        assert_eq!(updated.fare_total, 1000 * 2 + 100);

        // A second removal of the same seat sees the current set, not the
        // one the booking started with.
        let err = store
            .remove_seats("BRB-REMOVE01", &seat_names(&["2"]), 1000, 100)
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::SeatNotInBooking(_)));

        // Removing everything that is left cancels the booking.
        let cancelled = store
            .remove_seats("BRB-REMOVE01", &seat_names(&["1", "3"]), 1000, 100)
            .await
            .unwrap();
        assert_eq!(cancelled.status, BookingStatus::Cancelled);
        assert_eq!(cancelled.seat_numbers, seat_names(&["1", "3"]));
    }

    #[tokio::test]
    async fn test_payment_update_rejected_after_cancel() {
        let store = MemoryBookingStore::new();
        let booking = Booking::new(
            "BRB-CANCEL01".to_string(),
            "user-1".to_string(),
            Uuid::new_v4(),
            Uuid::new_v4(),
            seat_names(&["1"]),
            1000,
            "USD".to_string(),
        );
        store.insert(&booking).await.unwrap();
        store.mark_cancelled("BRB-CANCEL01").await.unwrap();

        let err = store
            .set_payment_status("BRB-CANCEL01", PaymentStatus::Paid)
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::BookingCancelled(_)));
    }
}
