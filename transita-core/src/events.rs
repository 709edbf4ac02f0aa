use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What happened to the listed seats.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SeatChange {
    Held,
    Booked,
    Released,
}

/// Emitted on every successful seat-state transition so live seat-map viewers
/// can update without polling. Delivery is best-effort; nothing in the ledger
/// depends on a subscriber receiving it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeatMapChangedEvent {
    pub bus_id: Uuid,
    pub schedule_id: Uuid,
    pub seat_numbers: Vec<String>,
    pub change: SeatChange,
    pub occurred_at: DateTime<Utc>,
}

impl SeatMapChangedEvent {
    pub fn new(
        bus_id: Uuid,
        schedule_id: Uuid,
        seat_numbers: Vec<String>,
        change: SeatChange,
    ) -> Self {
        Self {
            bus_id,
            schedule_id,
            seat_numbers,
            change,
            occurred_at: Utc::now(),
        }
    }
}
