//! Booking orchestrator.
//!
//! Drives the reserve -> charge sequence for one passenger and one seat:
//! create a pending booking row, claim the seat with a conditional update,
//! then open a checkout session with the payment provider. The store gives
//! no cross-table transaction, so every later failure compensates by
//! explicitly undoing the earlier writes.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::{AppConfig, PaymentConfig};
use crate::models::{Flight, NewBooking, SeatClass};
use crate::services::payment::{CheckoutRequest, PaymentError, PaymentGateway};
use crate::store::{DataStore, StoreError};

/// Fixed airline tag prefixed to every confirmation code.
const CONFIRMATION_PREFIX: &str = "AB";

const BASE36: &[u8; 36] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

#[derive(Debug, Error)]
pub enum BookingError {
    #[error("Flight not found")]
    FlightNotFound,
    #[error("Seat not found")]
    SeatNotFound,
    #[error("Failed to create booking")]
    BookingCreationFailed,
    #[error("Seat no longer available")]
    SeatUnavailable,
    #[error("Payment session could not be created")]
    PaymentSessionFailed(#[source] PaymentError),
    #[error("Payment not completed")]
    PaymentNotCompleted,
    #[error("Failed to confirm booking")]
    ConfirmationWriteFailed,
    /// Unexpected store fault; maps to a generic 5xx at the HTTP boundary.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Unexpected gateway fault outside session creation; maps to 502.
    #[error(transparent)]
    Payment(#[from] PaymentError),
}

#[derive(Debug, Clone)]
pub struct ReserveRequest {
    pub flight_id: Uuid,
    pub seat_number: String,
    pub seat_class: SeatClass,
    pub passenger_name: String,
    pub passenger_email: String,
    pub price: f64,
    /// None for guest bookings.
    pub user_id: Option<Uuid>,
}

#[derive(Debug, Clone)]
pub struct ReservationOutcome {
    pub booking_id: Uuid,
    pub confirmation_code: String,
    pub session_id: String,
    pub session_url: String,
}

/// Generates a human-facing booking reference: airline tag, epoch millis in
/// base-36, and a short random suffix. Collision-tolerant by design; never
/// checked against existing codes.
pub fn generate_confirmation_code() -> String {
    let millis = Utc::now().timestamp_millis().max(0) as u128;
    let suffix_seed = Uuid::new_v4().as_u128();
    format!(
        "{}{}{}",
        CONFIRMATION_PREFIX,
        to_base36(millis),
        random_suffix(suffix_seed, 3)
    )
}

fn to_base36(mut n: u128) -> String {
    if n == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(BASE36[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8(out).expect("base36 alphabet is ASCII")
}

fn random_suffix(mut seed: u128, len: usize) -> String {
    let mut out = Vec::with_capacity(len);
    for _ in 0..len {
        out.push(BASE36[(seed % 36) as usize]);
        seed /= 36;
    }
    String::from_utf8(out).expect("base36 alphabet is ASCII")
}

#[derive(Clone)]
pub struct BookingOrchestrator {
    store: Arc<dyn DataStore>,
    payments: Arc<dyn PaymentGateway>,
    site_url: String,
    currency: String,
}

impl BookingOrchestrator {
    pub fn new(
        store: Arc<dyn DataStore>,
        payments: Arc<dyn PaymentGateway>,
        app: &AppConfig,
        payment: &PaymentConfig,
    ) -> Self {
        Self {
            store,
            payments,
            site_url: app.site_url.clone(),
            currency: payment.currency.clone(),
        }
    }

    /// Reserves a seat and opens a checkout session for it.
    ///
    /// Ordering is deliberate: the booking row is created first because it is
    /// cheap to roll back, then the seat claim acts as the contention point.
    /// A lost seat race deletes the booking; a failed checkout-session call
    /// releases the seat and deletes the booking.
    pub async fn reserve_and_initiate_payment(
        &self,
        request: ReserveRequest,
    ) -> Result<ReservationOutcome, BookingError> {
        let flight = self
            .store
            .find_flight(request.flight_id)
            .await?
            .ok_or(BookingError::FlightNotFound)?;

        self.store
            .find_seat(request.flight_id, &request.seat_number, request.seat_class)
            .await?
            .ok_or(BookingError::SeatNotFound)?;

        let confirmation_code = generate_confirmation_code();

        let booking = self
            .store
            .insert_booking(NewBooking {
                user_id: request.user_id,
                flight_id: request.flight_id,
                passenger_name: request.passenger_name.clone(),
                passenger_email: request.passenger_email.clone(),
                seat_number: request.seat_number.clone(),
                seat_class: request.seat_class,
                price_paid: request.price,
                confirmation_code: confirmation_code.clone(),
            })
            .await
            .map_err(|e| {
                error!("Booking insert rejected: {}", e);
                BookingError::BookingCreationFailed
            })?;

        let claimed = self
            .store
            .claim_seat(
                request.flight_id,
                &request.seat_number,
                request.seat_class,
                booking.id,
            )
            .await
            .unwrap_or(false);

        if !claimed {
            // Lost the race. The booking row is the only thing to undo.
            warn!(
                "Seat {} {} on flight {} already taken, rolling back booking {}",
                request.seat_number, request.seat_class, request.flight_id, booking.id
            );
            self.store.delete_booking(booking.id).await?;
            return Err(BookingError::SeatUnavailable);
        }

        let checkout = self.build_checkout_request(&flight, &request, booking.id, &confirmation_code);

        let session = match self.payments.create_checkout_session(checkout).await {
            Ok(session) => session,
            Err(e) => {
                // Seat and booking would otherwise leak as a phantom
                // reservation with no payment session attached.
                warn!(
                    "Checkout session failed for booking {}, releasing seat: {}",
                    booking.id, e
                );
                self.store
                    .release_seat(request.flight_id, &request.seat_number, request.seat_class)
                    .await?;
                self.store.delete_booking(booking.id).await?;
                return Err(BookingError::PaymentSessionFailed(e));
            }
        };

        // Best-effort; the session id also travels in the redirect URL.
        if let Err(e) = self
            .store
            .record_payment_session(booking.id, &session.id)
            .await
        {
            warn!(
                "Could not record session {} on booking {}: {}",
                session.id, booking.id, e
            );
        }

        info!(
            "Booking {} reserved seat {} {} on flight {}, session {}",
            booking.id, request.seat_number, request.seat_class, flight.flight_number, session.id
        );

        Ok(ReservationOutcome {
            booking_id: booking.id,
            confirmation_code,
            session_id: session.id,
            session_url: session.url,
        })
    }

    fn build_checkout_request(
        &self,
        flight: &Flight,
        request: &ReserveRequest,
        booking_id: Uuid,
        confirmation_code: &str,
    ) -> CheckoutRequest {
        let mut metadata = HashMap::new();
        metadata.insert("booking_id".to_string(), booking_id.to_string());
        metadata.insert(
            "confirmation_code".to_string(),
            confirmation_code.to_string(),
        );

        CheckoutRequest {
            amount_minor: (request.price * 100.0).round() as i64,
            currency: self.currency.clone(),
            description: format!(
                "{} {} to {} - Seat {} ({})",
                flight.flight_number,
                flight.origin,
                flight.destination,
                request.seat_number,
                request.seat_class.as_str().to_uppercase()
            ),
            customer_email: request.passenger_email.clone(),
            success_url: format!(
                "{}/booking-confirmation?booking_id={}&session_id={{CHECKOUT_SESSION_ID}}",
                self.site_url, booking_id
            ),
            cancel_url: format!(
                "{}/book/{}?class={}",
                self.site_url, request.flight_id, request.seat_class
            ),
            metadata,
        }
    }
}
