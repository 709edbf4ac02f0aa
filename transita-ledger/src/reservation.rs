use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use transita_core::seat::dedupe_seat_numbers;
use transita_core::{LedgerError, ScheduleDirectory};

use crate::ledger::SeatLedger;

/// A temporary claim on a set of seats, valid until `expires_at`. Holds are
/// not persisted as records of their own; the expiry lives on the seats and
/// lapses passively.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hold {
    pub bus_id: Uuid,
    pub schedule_id: Uuid,
    pub seat_numbers: Vec<String>,
    pub holder: String,
    pub expires_at: DateTime<Utc>,
}

/// Passenger-facing seat holds with a fixed, configured TTL.
///
/// The TTL is minutes-scale and intentionally much shorter than the booking
/// payment deadline; the two are separate knobs.
pub struct ReservationManager {
    ledger: Arc<SeatLedger>,
    schedules: Arc<dyn ScheduleDirectory>,
    hold_ttl: Duration,
}

impl ReservationManager {
    pub fn new(
        ledger: Arc<SeatLedger>,
        schedules: Arc<dyn ScheduleDirectory>,
        hold_ttl: Duration,
    ) -> Self {
        Self {
            ledger,
            schedules,
            hold_ttl,
        }
    }

    /// Validate the selection against the bus layout and acquire a hold on
    /// every seat, all-or-nothing. Success broadcasts the seat-map change so
    /// concurrent viewers see the seats go unavailable without polling.
    pub async fn reserve(
        &self,
        bus_id: Uuid,
        schedule_id: Uuid,
        seat_numbers: &[String],
        holder: &str,
    ) -> Result<Hold, LedgerError> {
        if seat_numbers.is_empty() {
            return Err(LedgerError::EmptySelection);
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
            return Err(LedgerError::InvalidSeat(unknown));
        }

        let expires_at = Utc::now() + self.hold_ttl;
        self.ledger
            .hold_seats(bus_id, schedule_id, &seat_numbers, holder, expires_at)
            .await?;

        info!(
            %bus_id, %schedule_id, holder,
            seats = ?seat_numbers, %expires_at,
            "seats held"
        );

        Ok(Hold {
            bus_id,
            schedule_id,
            seat_numbers,
            holder: holder.to_string(),
            expires_at,
        })
    }
}
