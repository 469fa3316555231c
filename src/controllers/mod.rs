pub mod bookings;
pub mod flights;

use axum::{http::StatusCode, Json, Router};
use serde::Serialize;
use std::sync::Arc;

use crate::services::booking::BookingError;

pub fn routes() -> Router<Arc<crate::AppState>> {
    Router::new()
        .merge(flights::routes())
        .merge(bookings::routes())
}

/* ---------- shared error payload ---------- */

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
}

pub type ApiResult<T> = Result<T, (StatusCode, Json<ApiError>)>;

pub fn api_error(status: StatusCode, message: impl Into<String>) -> (StatusCode, Json<ApiError>) {
    (
        status,
        Json(ApiError {
            error: message.into(),
        }),
    )
}

/// Maps the booking error taxonomy onto HTTP statuses. Expected failures
/// carry their own user-safe message; infrastructure faults get a generic
/// one so internals never leak to clients.
pub fn booking_error_response(err: BookingError) -> (StatusCode, Json<ApiError>) {
    match &err {
        BookingError::FlightNotFound | BookingError::SeatNotFound => {
            api_error(StatusCode::NOT_FOUND, err.to_string())
        }
        BookingError::SeatUnavailable => api_error(StatusCode::CONFLICT, err.to_string()),
        BookingError::BookingCreationFailed | BookingError::ConfirmationWriteFailed => {
            api_error(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        }
        BookingError::PaymentSessionFailed(_) => api_error(StatusCode::BAD_GATEWAY, err.to_string()),
        BookingError::PaymentNotCompleted => {
            api_error(StatusCode::PAYMENT_REQUIRED, err.to_string())
        }
        BookingError::Store(e) => {
            tracing::error!("Unexpected store fault: {}", e);
            api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Unexpected error, please retry",
            )
        }
        BookingError::Payment(e) => {
            tracing::error!("Unexpected payment gateway fault: {}", e);
            api_error(StatusCode::BAD_GATEWAY, "Unexpected error, please retry")
        }
    }
}
