use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use tokio_stream::wrappers::BroadcastStream;
use uuid::Uuid;

use transita_core::Seat;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
struct ReserveRequest {
    bus_id: Uuid,
    schedule_id: Uuid,
    seat_numbers: Vec<String>,
    user_id: String,
}

#[derive(Debug, Serialize)]
struct ReserveResponse {
    status: String,
    seat_numbers: Vec<String>,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
struct SeatMapResponse {
    bus_id: Uuid,
    schedule_id: Uuid,
    seats: Vec<Seat>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route(
            "/v1/schedules/{schedule_id}/buses/{bus_id}/seats",
            get(list_seats),
        )
        .route(
            "/v1/schedules/{schedule_id}/buses/{bus_id}/stream",
            get(stream_seat_map),
        )
        .route("/v1/reservations", post(reserve_seats))
}

async fn list_seats(
    State(state): State<AppState>,
    Path((schedule_id, bus_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<SeatMapResponse>, AppError> {
    let seats = state.ledger.list_seats(bus_id, schedule_id).await?;
    Ok(Json(SeatMapResponse {
        bus_id,
        schedule_id,
        seats,
    }))
}

async fn reserve_seats(
    State(state): State<AppState>,
    Json(req): Json<ReserveRequest>,
) -> Result<Json<ReserveResponse>, AppError> {
    let hold = state
        .reservations
        .reserve(req.bus_id, req.schedule_id, &req.seat_numbers, &req.user_id)
        .await?;

    Ok(Json(ReserveResponse {
        status: "HELD".to_string(),
        seat_numbers: hold.seat_numbers,
        expires_at: hold.expires_at,
    }))
}

/// SSE stream of seat-map changes for one (bus, schedule) pair, so live
/// viewers see seats go unavailable without polling.
async fn stream_seat_map(
    State(state): State<AppState>,
    Path((schedule_id, bus_id)): Path<(Uuid, Uuid)>,
) -> impl IntoResponse {
    let rx = state.ledger.subscribe();

    let stream = BroadcastStream::new(rx).filter_map(move |result| async move {
        match result {
            Ok(event) if event.bus_id == bus_id && event.schedule_id == schedule_id => {
                Event::default()
                    .event("seat_map_changed")
                    .json_data(&event)
                    .ok()
                    .map(Ok::<_, std::convert::Infallible>)
            }
            // Other trips, or a lagged receiver: skip.
            _ => None,
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}
