use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use transita_core::{BookingError, LedgerError};

#[derive(Debug)]
pub enum AppError {
    Ledger(LedgerError),
    Booking(BookingError),
}

impl From<LedgerError> for AppError {
    fn from(e: LedgerError) -> Self {
        AppError::Ledger(e)
    }
}

impl From<BookingError> for AppError {
    fn from(e: BookingError) -> Self {
        match e {
            BookingError::Ledger(inner) => AppError::Ledger(inner),
            other => AppError::Booking(other),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message, seats) = match self {
            AppError::Ledger(e) => match e {
                LedgerError::SeatUnavailable(seats) => (
                    StatusCode::CONFLICT,
                    "seats unavailable".to_string(),
                    Some(seats),
                ),
                LedgerError::InvalidSeat(seats) => (
                    StatusCode::BAD_REQUEST,
                    "unknown seats".to_string(),
                    Some(seats),
                ),
                LedgerError::EmptySelection => (
                    StatusCode::BAD_REQUEST,
                    "no seats selected".to_string(),
                    None,
                ),
                LedgerError::ScheduleNotFound { .. } => {
                    (StatusCode::NOT_FOUND, e.to_string(), None)
                }
                LedgerError::Store(msg) => {
                    tracing::error!("seat store error: {}", msg);
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "internal server error".to_string(),
                        None,
                    )
                }
            },
            AppError::Booking(e) => match e {
                BookingError::NotFound(_) => (StatusCode::NOT_FOUND, e.to_string(), None),
                BookingError::InvalidPaymentStatus(_) => {
                    (StatusCode::BAD_REQUEST, e.to_string(), None)
                }
                BookingError::SeatNotInBooking(seats) => (
                    StatusCode::BAD_REQUEST,
                    "seats not in booking".to_string(),
                    Some(seats),
                ),
                BookingError::BookingCancelled(_) => {
                    (StatusCode::CONFLICT, e.to_string(), None)
                }
                BookingError::Ledger(_) | BookingError::Store(_) => {
                    tracing::error!("booking store error: {}", e);
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "internal server error".to_string(),
                        None,
                    )
                }
            },
        };

        let body = match seats {
            // Conflicting seat numbers are returned so the client can
            // re-render the seat map instead of retrying blindly.
            Some(seats) => Json(json!({ "error": message, "seats": seats })),
            None => Json(json!({ "error": message })),
        };

        (status, body).into_response()
    }
}
