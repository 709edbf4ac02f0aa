use axum::{
    extract::{Path, Query, State},
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

use transita_booking::BookingSummary;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
struct ConfirmRequest {
    bus_id: Uuid,
    schedule_id: Uuid,
    seat_numbers: Vec<String>,
    user_id: String,
}

#[derive(Debug, Deserialize)]
struct PaymentRequest {
    payment_status: String,
}

#[derive(Debug, Deserialize)]
struct CancelSeatsRequest {
    seat_numbers: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct SummaryParams {
    user_id: String,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/bookings", post(confirm_booking).get(user_summary))
        .route("/v1/bookings/{booking_ref}", get(get_booking))
        .route("/v1/bookings/{booking_ref}", delete(cancel_booking))
        .route("/v1/bookings/{booking_ref}/payment", put(update_payment))
        .route("/v1/bookings/{booking_ref}/seats/cancel", post(cancel_seats))
}

async fn confirm_booking(
    State(state): State<AppState>,
    Json(req): Json<ConfirmRequest>,
) -> Result<Json<BookingSummary>, AppError> {
    let booking = state
        .bookings
        .confirm(req.bus_id, req.schedule_id, &req.seat_numbers, &req.user_id)
        .await?;
    Ok(Json(BookingSummary::from(booking)))
}

async fn get_booking(
    State(state): State<AppState>,
    Path(booking_ref): Path<String>,
) -> Result<Json<BookingSummary>, AppError> {
    let booking = state
        .bookings
        .fetch(&booking_ref)
        .await?
        .ok_or(transita_core::BookingError::NotFound(booking_ref))?;
    Ok(Json(BookingSummary::from(booking)))
}

async fn update_payment(
    State(state): State<AppState>,
    Path(booking_ref): Path<String>,
    Json(req): Json<PaymentRequest>,
) -> Result<Json<BookingSummary>, AppError> {
    let booking = state
        .bookings
        .update_payment(&booking_ref, &req.payment_status)
        .await?;
    Ok(Json(BookingSummary::from(booking)))
}

async fn cancel_booking(
    State(state): State<AppState>,
    Path(booking_ref): Path<String>,
) -> Result<Json<BookingSummary>, AppError> {
    let booking = state.bookings.cancel(&booking_ref).await?;
    Ok(Json(BookingSummary::from(booking)))
}

async fn cancel_seats(
    State(state): State<AppState>,
    Path(booking_ref): Path<String>,
    Json(req): Json<CancelSeatsRequest>,
) -> Result<Json<BookingSummary>, AppError> {
    let booking = state
        .bookings
        .cancel_seats(&booking_ref, &req.seat_numbers)
        .await?;
    Ok(Json(BookingSummary::from(booking)))
}

async fn user_summary(
    State(state): State<AppState>,
    Query(params): Query<SummaryParams>,
) -> Result<Json<Vec<BookingSummary>>, AppError> {
    let summaries = state.bookings.summary(&params.user_id).await?;
    Ok(Json(summaries))
}
