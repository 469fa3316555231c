use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use chrono::NaiveDate;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::controllers::{api_error, ApiResult};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/flights", get(search_flights))
        .route("/flights/{flight_id}/seats", get(get_seats))
}

#[derive(Debug, Deserialize)]
pub struct FlightsQuery {
    pub origin: Option<String>,
    pub destination: Option<String>,
    /// Departure day, YYYY-MM-DD.
    pub date: Option<String>,
}

// GET /api/flights
async fn search_flights(
    State(state): State<Arc<AppState>>,
    Query(params): Query<FlightsQuery>,
) -> ApiResult<impl IntoResponse> {
    let date = match params.date.as_deref() {
        Some(raw) => Some(
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .map_err(|_| api_error(StatusCode::BAD_REQUEST, "date must be YYYY-MM-DD"))?,
        ),
        None => None,
    };

    let flights = state
        .store
        .search_flights(params.origin.as_deref(), params.destination.as_deref(), date)
        .await
        .map_err(|e| {
            tracing::error!("Flight search failed: {}", e);
            api_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to retrieve flights")
        })?;

    Ok((StatusCode::OK, Json(flights)))
}

// GET /api/flights/{flight_id}/seats
async fn get_seats(
    State(state): State<Arc<AppState>>,
    Path(flight_id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let flight = state.store.find_flight(flight_id).await.map_err(|e| {
        tracing::error!("Flight lookup failed: {}", e);
        api_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to retrieve seats")
    })?;

    if flight.is_none() {
        return Err(api_error(StatusCode::NOT_FOUND, "Flight not found"));
    }

    let seats = state.store.list_seats(flight_id).await.map_err(|e| {
        tracing::error!("Seat listing failed: {}", e);
        api_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to retrieve seats")
    })?;

    Ok((StatusCode::OK, Json(seats)))
}
