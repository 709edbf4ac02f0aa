use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single seat on one bus for one scheduled trip.
///
/// Occupancy is derived, not stored: a seat whose `reserved_until` lies in the
/// past counts as available even if the field is still populated. Readers apply
/// that rule at read time; no cleanup write is required for a hold to lapse.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Seat {
    pub seat_number: String,
    pub is_booked: bool,
    pub reserved_until: Option<DateTime<Utc>>,
    pub held_by: Option<String>,
}

/// Computed occupancy of a seat at a given instant.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SeatState {
    Available,
    Held,
    Booked,
}

impl Seat {
    pub fn new(seat_number: String) -> Self {
        Self {
            seat_number,
            is_booked: false,
            reserved_until: None,
            held_by: None,
        }
    }

    /// Occupancy at `now`, applying the lazy-expiry rule to stale holds.
    pub fn state_at(&self, now: DateTime<Utc>) -> SeatState {
        if self.is_booked {
            return SeatState::Booked;
        }
        match self.reserved_until {
            Some(until) if until > now => SeatState::Held,
            _ => SeatState::Available,
        }
    }

    pub fn is_available_at(&self, now: DateTime<Utc>) -> bool {
        self.state_at(now) == SeatState::Available
    }

    /// Copy of the seat with any lapsed hold stripped, for read-side views.
    pub fn normalized_at(&self, now: DateTime<Utc>) -> Seat {
        let mut seat = self.clone();
        if !seat.is_booked {
            if let Some(until) = seat.reserved_until {
                if until <= now {
                    seat.reserved_until = None;
                    seat.held_by = None;
                }
            }
        }
        seat
    }
}

/// Collapse duplicate seat numbers in a selection, keeping first-seen order.
pub fn dedupe_seat_numbers(seat_numbers: &[String]) -> Vec<String> {
    let mut seen = Vec::with_capacity(seat_numbers.len());
    for sn in seat_numbers {
        if !seen.contains(sn) {
            seen.push(sn.clone());
        }
    }
    seen
}
