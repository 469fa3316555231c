use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::models::{Flight, SeatClass};

/// Booking lifecycle. `pending -> completed` is performed exclusively by the
/// confirmation reconciler; `pending` bookings that lose the seat race are
/// deleted outright. Nothing ever leaves `completed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "booking_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Pending,
    Completed,
    Failed,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Booking {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub flight_id: Uuid,
    pub passenger_name: String,
    pub passenger_email: String,
    pub seat_number: String,
    pub seat_class: SeatClass,
    pub price_paid: f64,
    pub confirmation_code: String,
    pub payment_session_id: Option<String>,
    pub payment_ref: Option<String>,
    pub status: BookingStatus,
    pub created_at: DateTime<Utc>,
}

/// Field set the orchestrator supplies when creating a booking row.
/// Id, status and timestamps are assigned by the store.
#[derive(Debug, Clone)]
pub struct NewBooking {
    pub user_id: Option<Uuid>,
    pub flight_id: Uuid,
    pub passenger_name: String,
    pub passenger_email: String,
    pub seat_number: String,
    pub seat_class: SeatClass,
    pub price_paid: f64,
    pub confirmation_code: String,
}

/// Booking joined with its flight, as shown on the confirmation page.
#[derive(Debug, Clone, Serialize)]
pub struct BookingDetails {
    pub booking: Booking,
    pub flight: Flight,
}
