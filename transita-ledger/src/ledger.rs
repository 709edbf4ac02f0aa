use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

use transita_core::{
    BusLayout, LedgerError, Seat, SeatChange, SeatMapChangedEvent, SeatStore,
};

/// Authoritative view of seat occupancy for (bus, schedule) pairs.
///
/// All occupancy mutations in the system go through this type, which
/// delegates the conditional writes to the [`SeatStore`] and broadcasts a
/// [`SeatMapChangedEvent`] after every successful transition. The broadcast is
/// a UX convenience for live seat-map viewers; nothing here depends on a
/// subscriber receiving it.
pub struct SeatLedger {
    store: Arc<dyn SeatStore>,
    events: broadcast::Sender<SeatMapChangedEvent>,
}

impl SeatLedger {
    pub fn new(store: Arc<dyn SeatStore>, events: broadcast::Sender<SeatMapChangedEvent>) -> Self {
        Self { store, events }
    }

    /// Subscribe to seat-map change events.
    pub fn subscribe(&self) -> broadcast::Receiver<SeatMapChangedEvent> {
        self.events.subscribe()
    }

    /// Create the per-seat rows when a schedule opens for sale.
    pub async fn open_schedule(
        &self,
        bus_id: Uuid,
        schedule_id: Uuid,
        layout: &BusLayout,
    ) -> Result<(), LedgerError> {
        self.store
            .seed_seats(bus_id, schedule_id, &layout.seat_numbers)
            .await
    }

    /// Every seat with its occupancy computed at `now`. Lapsed holds read as
    /// available; no cleanup write happens here.
    pub async fn list_seats(
        &self,
        bus_id: Uuid,
        schedule_id: Uuid,
    ) -> Result<Vec<Seat>, LedgerError> {
        let now = Utc::now();
        let seats = self.store.list_seats(bus_id, schedule_id).await?;
        Ok(seats.iter().map(|s| s.normalized_at(now)).collect())
    }

    /// Place a hold on the listed seats until `until`, all-or-nothing.
    pub async fn hold_seats(
        &self,
        bus_id: Uuid,
        schedule_id: Uuid,
        seat_numbers: &[String],
        holder: &str,
        until: DateTime<Utc>,
    ) -> Result<(), LedgerError> {
        self.store
            .hold_seats(bus_id, schedule_id, seat_numbers, holder, until)
            .await?;
        self.emit(bus_id, schedule_id, seat_numbers, SeatChange::Held);
        Ok(())
    }

    /// Transition the listed seats to booked, all-or-nothing.
    pub async fn book_seats(
        &self,
        bus_id: Uuid,
        schedule_id: Uuid,
        seat_numbers: &[String],
    ) -> Result<(), LedgerError> {
        self.store
            .book_seats(bus_id, schedule_id, seat_numbers)
            .await?;
        self.emit(bus_id, schedule_id, seat_numbers, SeatChange::Booked);
        Ok(())
    }

    /// Clear occupancy on the listed seats. Idempotent.
    pub async fn release_seats(
        &self,
        bus_id: Uuid,
        schedule_id: Uuid,
        seat_numbers: &[String],
    ) -> Result<(), LedgerError> {
        self.store
            .release_seats(bus_id, schedule_id, seat_numbers)
            .await?;
        self.emit(bus_id, schedule_id, seat_numbers, SeatChange::Released);
        Ok(())
    }

    fn emit(&self, bus_id: Uuid, schedule_id: Uuid, seat_numbers: &[String], change: SeatChange) {
        let event =
            SeatMapChangedEvent::new(bus_id, schedule_id, seat_numbers.to_vec(), change);
        // No subscribers is fine.
        if self.events.send(event).is_err() {
            debug!(%bus_id, %schedule_id, "seat-map event dropped, no subscribers");
        }
    }
}
