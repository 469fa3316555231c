use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::controllers::{api_error, booking_error_response, ApiResult};
use crate::middleware::{AuthUser, MaybeAuthUser};
use crate::models::SeatClass;
use crate::services::booking::ReserveRequest;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/bookings", post(create_booking))
        .route("/bookings", get(get_user_bookings))
        .route("/bookings/confirm", post(confirm_booking))
}

/* ---------- create booking ---------- */

// POST /api/bookings
#[derive(Debug, Deserialize, Validate)]
pub struct CreateBookingRequest {
    pub flight_id: Uuid,
    #[validate(length(min = 1, max = 4))]
    pub seat_number: String,
    pub seat_class: SeatClass,
    #[validate(length(min = 1, max = 200))]
    pub passenger_name: String,
    #[validate(email)]
    pub passenger_email: String,
    #[validate(range(min = 0.01))]
    pub price: f64,
}

#[derive(Debug, Serialize)]
struct CreateBookingResponse {
    booking_id: Uuid,
    confirmation_code: String,
    session_id: String,
    session_url: String,
}

async fn create_booking(
    State(state): State<Arc<AppState>>,
    MaybeAuthUser(user): MaybeAuthUser,
    Json(req): Json<CreateBookingRequest>,
) -> ApiResult<impl IntoResponse> {
    req.validate()
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, e.to_string()))?;

    let outcome = state
        .orchestrator
        .reserve_and_initiate_payment(ReserveRequest {
            flight_id: req.flight_id,
            seat_number: req.seat_number,
            seat_class: req.seat_class,
            passenger_name: req.passenger_name,
            passenger_email: req.passenger_email,
            price: req.price,
            user_id: user.map(|u| u.user_id),
        })
        .await
        .map_err(booking_error_response)?;

    Ok((
        StatusCode::CREATED,
        Json(CreateBookingResponse {
            booking_id: outcome.booking_id,
            confirmation_code: outcome.confirmation_code,
            session_id: outcome.session_id,
            session_url: outcome.session_url,
        }),
    ))
}

/* ---------- confirm booking ---------- */

// POST /api/bookings/confirm
#[derive(Debug, Deserialize)]
pub struct ConfirmBookingRequest {
    pub booking_id: Uuid,
    pub session_id: String,
}

async fn confirm_booking(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ConfirmBookingRequest>,
) -> ApiResult<impl IntoResponse> {
    if req.session_id.is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "session_id is required"));
    }

    let details = state
        .reconciler
        .confirm_payment(req.booking_id, &req.session_id)
        .await
        .map_err(booking_error_response)?;

    Ok((
        StatusCode::OK,
        Json(serde_json::json!({ "booking": details })),
    ))
}

/* ---------- my bookings ---------- */

// GET /api/bookings
async fn get_user_bookings(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> ApiResult<impl IntoResponse> {
    let bookings = state
        .store
        .list_bookings_for_user(user.user_id)
        .await
        .map_err(|e| {
            tracing::error!("Booking listing failed for {}: {}", user.user_id, e);
            api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to retrieve bookings",
            )
        })?;

    Ok((StatusCode::OK, Json(bookings)))
}
