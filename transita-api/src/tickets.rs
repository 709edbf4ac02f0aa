use axum::{
    extract::{Path, State},
    routing::post,
    Json, Router,
};
use serde::Serialize;

use transita_booking::BookingSummary;
use transita_core::BookingError;
use transita_ticket::TicketPayload;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Serialize)]
struct VerifyResponse {
    valid: bool,
    /// Present when the signature checks out and the booking still exists;
    /// boarding eligibility is decided from its live status, not from the
    /// signature alone.
    booking: Option<BookingSummary>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/tickets/{booking_ref}", post(issue_ticket))
        .route("/v1/tickets/verify", post(verify_ticket))
}

async fn issue_ticket(
    State(state): State<AppState>,
    Path(booking_ref): Path<String>,
) -> Result<Json<TicketPayload>, AppError> {
    // Only real bookings get tickets; the payload itself stays independent of
    // the booking's mutable state.
    state
        .bookings
        .fetch(&booking_ref)
        .await?
        .ok_or(BookingError::NotFound(booking_ref.clone()))?;

    Ok(Json(state.signer.issue(&booking_ref)))
}

async fn verify_ticket(
    State(state): State<AppState>,
    Json(payload): Json<TicketPayload>,
) -> Result<Json<VerifyResponse>, AppError> {
    let valid = state.signer.verify(&payload);
    if !valid {
        return Ok(Json(VerifyResponse {
            valid: false,
            booking: None,
        }));
    }

    let booking = state
        .bookings
        .fetch(&payload.booking_ref)
        .await?
        .map(BookingSummary::from);

    Ok(Json(VerifyResponse { valid, booking }))
}
