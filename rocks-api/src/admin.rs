use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    routing::{get, post, put},
    Json, Router,
};
use rocks_booking::{BookingFilter, BookingStats, RecoveryReport, SyncOptions, SyncReport, TourStats, TourUpsert};
use rocks_core::booking::Booking;
use rocks_core::payment::PaymentTransaction;
use rocks_core::tour::Tour;
use std::time::Duration;

use crate::{error::AppError, middleware::admin_auth_middleware, state::AppState};

/// Every route here sits behind [`admin_auth_middleware`].
pub fn routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/admin/sync-occupied-dates", post(sync_occupied_dates))
        .route("/admin/bookings", get(list_bookings))
        .route("/admin/bookings/{booking_id}/cancel", post(cancel_booking))
        .route("/admin/payments", get(list_payments))
        .route("/admin/payments/recover", post(recover_payments))
        .route("/admin/stats", get(global_stats))
        .route("/admin/tours/{tour_id}", put(upsert_tour))
        .route("/admin/tours/{tour_id}/stats", get(tour_stats))
        .route_layer(axum::middleware::from_fn_with_state(state, admin_auth_middleware))
}

/// POST /admin/sync-occupied-dates
///
/// Body is optional; `{"prune": true}` also drops dates nobody holds.
async fn sync_occupied_dates(State(state): State<AppState>, body: Bytes) -> Result<Json<SyncReport>, AppError> {
    let options: SyncOptions = if body.is_empty() {
        SyncOptions::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| AppError::ValidationError(format!("Invalid sync options: {}", e)))?
    };
    Ok(Json(state.sync.run(options).await?))
}

/// GET /admin/bookings?status=&tour_id=
async fn list_bookings(
    State(state): State<AppState>,
    Query(filter): Query<BookingFilter>,
) -> Result<Json<Vec<Booking>>, AppError> {
    Ok(Json(state.reservations.list_bookings(&filter).await?))
}

/// POST /admin/bookings/{booking_id}/cancel
async fn cancel_booking(
    State(state): State<AppState>,
    Path(booking_id): Path<String>,
) -> Result<Json<Booking>, AppError> {
    Ok(Json(state.reservations.release(&booking_id).await?))
}

async fn list_payments(State(state): State<AppState>) -> Result<Json<Vec<PaymentTransaction>>, AppError> {
    Ok(Json(state.payments.list_transactions().await?))
}

/// POST /admin/payments/recover
async fn recover_payments(State(state): State<AppState>) -> Result<Json<RecoveryReport>, AppError> {
    let older_than = Duration::from_secs(state.business_rules.stale_payment_seconds);
    Ok(Json(state.payments.recover_stale_payments(older_than).await?))
}

async fn global_stats(State(state): State<AppState>) -> Result<Json<BookingStats>, AppError> {
    Ok(Json(state.stats.global().await?))
}

async fn tour_stats(State(state): State<AppState>, Path(tour_id): Path<String>) -> Result<Json<TourStats>, AppError> {
    Ok(Json(state.stats.for_tour(&tour_id).await?))
}

/// PUT /admin/tours/{tour_id}
async fn upsert_tour(
    State(state): State<AppState>,
    Path(tour_id): Path<String>,
    Json(req): Json<TourUpsert>,
) -> Result<Json<Tour>, AppError> {
    Ok(Json(state.catalog.upsert_tour(&tour_id, req).await?))
}
