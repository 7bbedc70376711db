use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
    Json, Router,
};
use futures_util::{Stream, StreamExt};
use rocks_booking::Availability;
use rocks_core::dates::BookingDate;
use rocks_core::tour::Tour;
use serde_json::{json, Value};
use tokio_stream::wrappers::BroadcastStream;

use crate::{error::AppError, state::AppState};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/tours/{tour_id}", get(get_tour))
        .route("/tours/{tour_id}/occupied-dates", get(occupied_dates))
        .route("/tours/{tour_id}/occupied-dates/stream", get(occupancy_stream))
        .route("/tours/{tour_id}/availability/{date}", get(availability))
}

async fn get_tour(State(state): State<AppState>, Path(tour_id): Path<String>) -> Result<Json<Tour>, AppError> {
    Ok(Json(state.catalog.get_tour(&tour_id).await?))
}

/// GET /tours/{tour_id}/occupied-dates
async fn occupied_dates(
    State(state): State<AppState>,
    Path(tour_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let dates = state.catalog.occupied_dates(&tour_id).await?;
    Ok(Json(json!({ "tour_id": tour_id, "occupied_dates": dates })))
}

/// GET /tours/{tour_id}/availability/{date}
async fn availability(
    State(state): State<AppState>,
    Path((tour_id, date)): Path<(String, String)>,
) -> Result<Json<Availability>, AppError> {
    let date = BookingDate::parse(&date).map_err(|e| AppError::ValidationError(e.to_string()))?;
    Ok(Json(state.reservations.is_available(&tour_id, &date).await?))
}

/// GET /tours/{tour_id}/occupied-dates/stream
///
/// Server-sent events for reservations, confirmations and releases on one
/// tour. Lagging subscribers silently skip missed events.
async fn occupancy_stream(
    State(state): State<AppState>,
    Path(tour_id): Path<String>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let rx = state.feed.subscribe();

    let stream = BroadcastStream::new(rx).filter_map(move |result| {
        let tour_id = tour_id.clone();
        async move {
            match result {
                Ok(event) if event.tour_id == tour_id => {
                    Some(Event::default().event(event.kind.as_str()).json_data(&event))
                }
                _ => None,
            }
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}
