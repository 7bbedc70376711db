use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use rocks_core::booking::{Booking, BookingStatus, NewBooking};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::{error::AppError, state::AppState};

#[derive(Debug, Serialize)]
pub struct CreateBookingResponse {
    pub booking_id: String,
    pub date_booked: String,
    pub status: BookingStatus,
    pub total_amount: Decimal,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/bookings", post(create_booking))
        .route("/bookings/{booking_id}", get(get_booking))
}

/// POST /bookings
async fn create_booking(
    State(state): State<AppState>,
    Json(req): Json<NewBooking>,
) -> Result<(StatusCode, Json<CreateBookingResponse>), AppError> {
    let booking = state.reservations.reserve(req).await?;

    Ok((
        StatusCode::CREATED,
        Json(CreateBookingResponse {
            date_booked: booking.selected_date.to_string(),
            booking_id: booking.id,
            status: booking.status,
            total_amount: booking.total_amount,
        }),
    ))
}

/// GET /bookings/{booking_id}
async fn get_booking(
    State(state): State<AppState>,
    Path(booking_id): Path<String>,
) -> Result<Json<Booking>, AppError> {
    Ok(Json(state.reservations.get_booking(&booking_id).await?))
}
