use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::BookingError;

/// Ride state of a booking. Payment is tracked separately on
/// [`PaymentStatus`]; a `Confirmed` booking with a pending payment is the
/// at-risk state the expiry sweep acts on.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    Confirmed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
}

impl PaymentStatus {
    /// Parse a client-supplied payment status, rejecting anything outside the
    /// domain before a write is attempted.
    pub fn parse(value: &str) -> Result<Self, BookingError> {
        match value.to_ascii_uppercase().as_str() {
            "PENDING" => Ok(PaymentStatus::Pending),
            "PAID" => Ok(PaymentStatus::Paid),
            "FAILED" => Ok(PaymentStatus::Failed),
            _ => Err(BookingError::InvalidPaymentStatus(value.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Paid => "PAID",
            PaymentStatus::Failed => "FAILED",
        }
    }
}

impl BookingStatus {
    pub fn parse(value: &str) -> Result<Self, BookingError> {
        match value.to_ascii_uppercase().as_str() {
            "CONFIRMED" => Ok(BookingStatus::Confirmed),
            "CANCELLED" => Ok(BookingStatus::Cancelled),
            _ => Err(BookingError::Store(format!("unknown booking status: {value}"))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Confirmed => "CONFIRMED",
            BookingStatus::Cancelled => "CANCELLED",
        }
    }
}

/// A persisted group of seats purchased together. Bookings are closed by
/// setting `status`, never deleted, so the record doubles as an audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: Uuid,
    /// Human-stable reference shown to passengers, distinct from `id`.
    pub booking_ref: String,
    pub user_id: String,
    pub bus_id: Uuid,
    pub schedule_id: Uuid,
    pub seat_numbers: Vec<String>,
    pub fare_total: i64,
    pub currency: String,
    pub status: BookingStatus,
    pub payment_status: PaymentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    pub fn new(
        booking_ref: String,
        user_id: String,
        bus_id: Uuid,
        schedule_id: Uuid,
        seat_numbers: Vec<String>,
        fare_total: i64,
        currency: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            booking_ref,
            user_id,
            bus_id,
            schedule_id,
            seat_numbers,
            fare_total,
            currency,
            status: BookingStatus::Confirmed,
            payment_status: PaymentStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the payment deadline has elapsed, measured from `created_at`.
    pub fn payment_overdue(&self, now: DateTime<Utc>, deadline: chrono::Duration) -> bool {
        self.status == BookingStatus::Confirmed
            && self.payment_status == PaymentStatus::Pending
            && now - self.created_at >= deadline
    }
}
