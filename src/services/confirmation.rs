//! Confirmation reconciler.
//!
//! Given a returning client's booking id and checkout-session reference,
//! reads the provider's authoritative payment state and finalizes the
//! booking. Owns the `pending -> completed` transition exclusively.

use std::sync::Arc;

use tracing::{error, info};
use uuid::Uuid;

use crate::models::BookingDetails;
use crate::services::booking::BookingError;
use crate::services::payment::{PaymentError, PaymentGateway, PaymentStatus};
use crate::store::DataStore;

#[derive(Clone)]
pub struct ConfirmationReconciler {
    store: Arc<dyn DataStore>,
    payments: Arc<dyn PaymentGateway>,
}

impl ConfirmationReconciler {
    pub fn new(store: Arc<dyn DataStore>, payments: Arc<dyn PaymentGateway>) -> Self {
        Self { store, payments }
    }

    /// Verifies payment with the provider and marks the booking completed.
    ///
    /// Safe to retry: the payment check is a read, and re-applying the
    /// completed status to an already completed booking changes nothing.
    /// Confirmation pages get reloaded, so this is exercised in practice.
    pub async fn confirm_payment(
        &self,
        booking_id: Uuid,
        session_id: &str,
    ) -> Result<BookingDetails, BookingError> {
        let session = match self.payments.retrieve_session(session_id).await {
            Ok(session) => session,
            // A session reference the provider does not know cannot be paid.
            Err(PaymentError::UnknownSession(_)) => {
                return Err(BookingError::PaymentNotCompleted);
            }
            Err(e) => {
                error!("Session lookup failed for booking {}: {}", booking_id, e);
                return Err(e.into());
            }
        };

        if session.payment_status != PaymentStatus::Paid {
            return Err(BookingError::PaymentNotCompleted);
        }

        let payment_ref = session
            .payment_ref
            .unwrap_or_else(|| session.id.clone());

        let updated = self
            .store
            .complete_booking(booking_id, &payment_ref)
            .await
            .unwrap_or(false);

        if !updated {
            // Money has moved at the provider but local state still says
            // pending. Needs out-of-band reconciliation; log loudly.
            error!(
                "RECONCILIATION GAP: payment {} verified paid but booking {} could not be completed",
                payment_ref, booking_id
            );
            return Err(BookingError::ConfirmationWriteFailed);
        }

        let details = self
            .store
            .find_booking_with_flight(booking_id)
            .await?
            .ok_or(BookingError::ConfirmationWriteFailed)?;

        info!(
            "Booking {} confirmed, payment ref {}",
            booking_id, payment_ref
        );
        Ok(details)
    }
}
