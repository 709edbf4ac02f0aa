use chrono::Duration;
use std::sync::Arc;
use tokio::sync::broadcast;

use transita_booking::{BookingManager, ExpirySweeper};
use transita_core::{BookingStore, ScheduleDirectory, SeatStore};
use transita_ledger::{ReservationManager, SeatLedger};
use transita_store::app_config::BusinessRules;
use transita_ticket::{TicketError, TicketSigner};

#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<SeatLedger>,
    pub reservations: Arc<ReservationManager>,
    pub bookings: Arc<BookingManager>,
    pub sweeper: Arc<ExpirySweeper>,
    pub signer: TicketSigner,
}

impl AppState {
    /// Wire the core services over the given stores. Used with the Postgres
    /// stores in `main` and with the in-memory stores in tests.
    pub fn build(
        seat_store: Arc<dyn SeatStore>,
        booking_store: Arc<dyn BookingStore>,
        schedules: Arc<dyn ScheduleDirectory>,
        rules: &BusinessRules,
        ticket_secret: &str,
    ) -> Result<Self, TicketError> {
        let (events_tx, _) = broadcast::channel(256);
        let ledger = Arc::new(SeatLedger::new(seat_store, events_tx));

        let reservations = Arc::new(ReservationManager::new(
            ledger.clone(),
            schedules.clone(),
            Duration::seconds(rules.seat_hold_seconds as i64),
        ));
        let bookings = Arc::new(BookingManager::new(
            ledger.clone(),
            booking_store.clone(),
            schedules,
            rules.booking_fee,
        ));
        let sweeper = Arc::new(ExpirySweeper::new(
            booking_store,
            ledger.clone(),
            Duration::hours(rules.payment_deadline_hours as i64),
        ));
        let signer = TicketSigner::new(ticket_secret)?;

        Ok(Self {
            ledger,
            reservations,
            bookings,
            sweeper,
            signer,
        })
    }
}
