//! Data store gateway.
//!
//! All persistence goes through the [`DataStore`] trait so the booking
//! workflow can be driven against Postgres in production and an in-memory
//! store in tests. The store serializes concurrent writes per row; no
//! cross-table transaction is assumed anywhere, which is why the booking
//! workflow compensates instead of relying on atomicity.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use sqlx::PgPool;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{Booking, BookingDetails, BookingStatus, Flight, NewBooking, Seat, SeatClass, User};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    /// Injected by the in-memory store to simulate a rejected write.
    #[error("write rejected: {0}")]
    WriteRejected(String),
}

#[async_trait]
pub trait DataStore: Send + Sync {
    async fn find_flight(&self, flight_id: Uuid) -> Result<Option<Flight>, StoreError>;

    async fn search_flights(
        &self,
        origin: Option<&str>,
        destination: Option<&str>,
        date: Option<NaiveDate>,
    ) -> Result<Vec<Flight>, StoreError>;

    async fn list_seats(&self, flight_id: Uuid) -> Result<Vec<Seat>, StoreError>;

    async fn find_seat(
        &self,
        flight_id: Uuid,
        seat_number: &str,
        seat_class: SeatClass,
    ) -> Result<Option<Seat>, StoreError>;

    async fn insert_booking(&self, new: NewBooking) -> Result<Booking, StoreError>;

    async fn delete_booking(&self, booking_id: Uuid) -> Result<(), StoreError>;

    /// Conditionally flips the seat to unavailable, scoped by flight, seat
    /// number, class and current availability. Returns `false` when the
    /// predicate matched no row, i.e. the caller lost the race or the seat
    /// does not exist. This is the sole double-booking defense.
    async fn claim_seat(
        &self,
        flight_id: Uuid,
        seat_number: &str,
        seat_class: SeatClass,
        booking_id: Uuid,
    ) -> Result<bool, StoreError>;

    async fn release_seat(
        &self,
        flight_id: Uuid,
        seat_number: &str,
        seat_class: SeatClass,
    ) -> Result<(), StoreError>;

    async fn record_payment_session(
        &self,
        booking_id: Uuid,
        session_id: &str,
    ) -> Result<(), StoreError>;

    /// Marks the booking completed and records the provider's payment
    /// reference. Returns `false` when no such booking exists. Re-applying
    /// the same update to an already completed booking is a no-op success.
    async fn complete_booking(
        &self,
        booking_id: Uuid,
        payment_ref: &str,
    ) -> Result<bool, StoreError>;

    async fn find_booking_with_flight(
        &self,
        booking_id: Uuid,
    ) -> Result<Option<BookingDetails>, StoreError>;

    async fn list_bookings_for_user(&self, user_id: Uuid) -> Result<Vec<BookingDetails>, StoreError>;

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;
}

/* ---------- Postgres implementation ---------- */

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DataStore for PgStore {
    async fn find_flight(&self, flight_id: Uuid) -> Result<Option<Flight>, StoreError> {
        let flight = sqlx::query_as::<_, Flight>("SELECT * FROM flights WHERE id = $1")
            .bind(flight_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(flight)
    }

    async fn search_flights(
        &self,
        origin: Option<&str>,
        destination: Option<&str>,
        date: Option<NaiveDate>,
    ) -> Result<Vec<Flight>, StoreError> {
        let mut q = String::from("SELECT * FROM flights WHERE 1=1");
        let mut bind_idx = 1;
        if origin.is_some() {
            q.push_str(&format!(" AND origin = ${}", bind_idx));
            bind_idx += 1;
        }
        if destination.is_some() {
            q.push_str(&format!(" AND destination = ${}", bind_idx));
            bind_idx += 1;
        }
        if date.is_some() {
            q.push_str(&format!(" AND departure_time::date = ${}", bind_idx));
        }
        q.push_str(" ORDER BY departure_time");

        let mut dbq = sqlx::query_as::<_, Flight>(&q);
        if let Some(o) = origin {
            dbq = dbq.bind(o.to_string());
        }
        if let Some(d) = destination {
            dbq = dbq.bind(d.to_string());
        }
        if let Some(day) = date {
            dbq = dbq.bind(day);
        }

        Ok(dbq.fetch_all(&self.pool).await?)
    }

    async fn list_seats(&self, flight_id: Uuid) -> Result<Vec<Seat>, StoreError> {
        let seats = sqlx::query_as::<_, Seat>(
            "SELECT * FROM seats WHERE flight_id = $1 ORDER BY seat_class, seat_number",
        )
        .bind(flight_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(seats)
    }

    async fn find_seat(
        &self,
        flight_id: Uuid,
        seat_number: &str,
        seat_class: SeatClass,
    ) -> Result<Option<Seat>, StoreError> {
        let seat = sqlx::query_as::<_, Seat>(
            "SELECT * FROM seats WHERE flight_id = $1 AND seat_number = $2 AND seat_class = $3",
        )
        .bind(flight_id)
        .bind(seat_number)
        .bind(seat_class)
        .fetch_optional(&self.pool)
        .await?;
        Ok(seat)
    }

    async fn insert_booking(&self, new: NewBooking) -> Result<Booking, StoreError> {
        let booking = sqlx::query_as::<_, Booking>(
            r#"
            INSERT INTO bookings
                (user_id, flight_id, passenger_name, passenger_email,
                 seat_number, seat_class, price_paid, confirmation_code, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'pending')
            RETURNING *
            "#,
        )
        .bind(new.user_id)
        .bind(new.flight_id)
        .bind(&new.passenger_name)
        .bind(&new.passenger_email)
        .bind(&new.seat_number)
        .bind(new.seat_class)
        .bind(new.price_paid)
        .bind(&new.confirmation_code)
        .fetch_one(&self.pool)
        .await?;
        Ok(booking)
    }

    async fn delete_booking(&self, booking_id: Uuid) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM bookings WHERE id = $1")
            .bind(booking_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn claim_seat(
        &self,
        flight_id: Uuid,
        seat_number: &str,
        seat_class: SeatClass,
        booking_id: Uuid,
    ) -> Result<bool, StoreError> {
        // The is_available predicate makes this a compare-and-swap: under
        // concurrent claims for the same seat at most one UPDATE matches.
        let result = sqlx::query(
            r#"
            UPDATE seats
            SET is_available = FALSE, booking_id = $1
            WHERE flight_id = $2 AND seat_number = $3 AND seat_class = $4
              AND is_available = TRUE
            "#,
        )
        .bind(booking_id)
        .bind(flight_id)
        .bind(seat_number)
        .bind(seat_class)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn release_seat(
        &self,
        flight_id: Uuid,
        seat_number: &str,
        seat_class: SeatClass,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE seats
            SET is_available = TRUE, booking_id = NULL
            WHERE flight_id = $1 AND seat_number = $2 AND seat_class = $3
            "#,
        )
        .bind(flight_id)
        .bind(seat_number)
        .bind(seat_class)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn record_payment_session(
        &self,
        booking_id: Uuid,
        session_id: &str,
    ) -> Result<(), StoreError> {
        sqlx::query("UPDATE bookings SET payment_session_id = $1 WHERE id = $2")
            .bind(session_id)
            .bind(booking_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn complete_booking(
        &self,
        booking_id: Uuid,
        payment_ref: &str,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE bookings SET status = 'completed', payment_ref = $1 WHERE id = $2",
        )
        .bind(payment_ref)
        .bind(booking_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn find_booking_with_flight(
        &self,
        booking_id: Uuid,
    ) -> Result<Option<BookingDetails>, StoreError> {
        let booking = sqlx::query_as::<_, Booking>("SELECT * FROM bookings WHERE id = $1")
            .bind(booking_id)
            .fetch_optional(&self.pool)
            .await?;

        let booking = match booking {
            Some(b) => b,
            None => return Ok(None),
        };

        let flight = sqlx::query_as::<_, Flight>("SELECT * FROM flights WHERE id = $1")
            .bind(booking.flight_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(Some(BookingDetails { booking, flight }))
    }

    async fn list_bookings_for_user(&self, user_id: Uuid) -> Result<Vec<BookingDetails>, StoreError> {
        let bookings = sqlx::query_as::<_, Booking>(
            "SELECT * FROM bookings WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        let mut details = Vec::with_capacity(bookings.len());
        for booking in bookings {
            let flight = sqlx::query_as::<_, Flight>("SELECT * FROM flights WHERE id = $1")
                .bind(booking.flight_id)
                .fetch_one(&self.pool)
                .await?;
            details.push(BookingDetails { booking, flight });
        }
        Ok(details)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(
            "SELECT * FROM users WHERE email = $1 AND is_active = TRUE",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }
}

/* ---------- in-memory implementation ---------- */

#[derive(Default)]
struct MemState {
    flights: HashMap<Uuid, Flight>,
    seats: Vec<Seat>,
    bookings: HashMap<Uuid, Booking>,
    users: Vec<User>,
    fail_booking_inserts: bool,
    fail_booking_updates: bool,
}

/// In-memory store for tests. The seat claim performs the same
/// compare-and-swap as the Postgres implementation, under one mutex.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<MemState>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_flight(&self, flight: Flight) {
        self.state.lock().unwrap().flights.insert(flight.id, flight);
    }

    pub fn add_seat(&self, seat: Seat) {
        self.state.lock().unwrap().seats.push(seat);
    }

    pub fn add_user(&self, user: User) {
        self.state.lock().unwrap().users.push(user);
    }

    /// Makes subsequent booking inserts fail, simulating a rejected write.
    pub fn set_fail_booking_inserts(&self, fail: bool) {
        self.state.lock().unwrap().fail_booking_inserts = fail;
    }

    /// Makes subsequent booking status updates fail.
    pub fn set_fail_booking_updates(&self, fail: bool) {
        self.state.lock().unwrap().fail_booking_updates = fail;
    }

    pub fn booking(&self, booking_id: Uuid) -> Option<Booking> {
        self.state.lock().unwrap().bookings.get(&booking_id).cloned()
    }

    pub fn booking_count(&self) -> usize {
        self.state.lock().unwrap().bookings.len()
    }

    pub fn seat(&self, flight_id: Uuid, seat_number: &str, seat_class: SeatClass) -> Option<Seat> {
        self.state
            .lock()
            .unwrap()
            .seats
            .iter()
            .find(|s| {
                s.flight_id == flight_id
                    && s.seat_number == seat_number
                    && s.seat_class == seat_class
            })
            .cloned()
    }
}

#[async_trait]
impl DataStore for InMemoryStore {
    async fn find_flight(&self, flight_id: Uuid) -> Result<Option<Flight>, StoreError> {
        Ok(self.state.lock().unwrap().flights.get(&flight_id).cloned())
    }

    async fn search_flights(
        &self,
        origin: Option<&str>,
        destination: Option<&str>,
        date: Option<NaiveDate>,
    ) -> Result<Vec<Flight>, StoreError> {
        let state = self.state.lock().unwrap();
        let mut flights: Vec<Flight> = state
            .flights
            .values()
            .filter(|f| origin.is_none_or(|o| f.origin == o))
            .filter(|f| destination.is_none_or(|d| f.destination == d))
            .filter(|f| date.is_none_or(|day| f.departure_time.date_naive() == day))
            .cloned()
            .collect();
        flights.sort_by_key(|f| f.departure_time);
        Ok(flights)
    }

    async fn list_seats(&self, flight_id: Uuid) -> Result<Vec<Seat>, StoreError> {
        let state = self.state.lock().unwrap();
        let mut seats: Vec<Seat> = state
            .seats
            .iter()
            .filter(|s| s.flight_id == flight_id)
            .cloned()
            .collect();
        seats.sort_by(|a, b| a.seat_number.cmp(&b.seat_number));
        Ok(seats)
    }

    async fn find_seat(
        &self,
        flight_id: Uuid,
        seat_number: &str,
        seat_class: SeatClass,
    ) -> Result<Option<Seat>, StoreError> {
        Ok(self.seat(flight_id, seat_number, seat_class))
    }

    async fn insert_booking(&self, new: NewBooking) -> Result<Booking, StoreError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_booking_inserts {
            return Err(StoreError::WriteRejected("insert refused".to_string()));
        }
        let booking = Booking {
            id: Uuid::new_v4(),
            user_id: new.user_id,
            flight_id: new.flight_id,
            passenger_name: new.passenger_name,
            passenger_email: new.passenger_email,
            seat_number: new.seat_number,
            seat_class: new.seat_class,
            price_paid: new.price_paid,
            confirmation_code: new.confirmation_code,
            payment_session_id: None,
            payment_ref: None,
            status: BookingStatus::Pending,
            created_at: Utc::now(),
        };
        state.bookings.insert(booking.id, booking.clone());
        Ok(booking)
    }

    async fn delete_booking(&self, booking_id: Uuid) -> Result<(), StoreError> {
        self.state.lock().unwrap().bookings.remove(&booking_id);
        Ok(())
    }

    async fn claim_seat(
        &self,
        flight_id: Uuid,
        seat_number: &str,
        seat_class: SeatClass,
        booking_id: Uuid,
    ) -> Result<bool, StoreError> {
        let mut state = self.state.lock().unwrap();
        let seat = state.seats.iter_mut().find(|s| {
            s.flight_id == flight_id
                && s.seat_number == seat_number
                && s.seat_class == seat_class
                && s.is_available
        });
        match seat {
            Some(seat) => {
                seat.is_available = false;
                seat.booking_id = Some(booking_id);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn release_seat(
        &self,
        flight_id: Uuid,
        seat_number: &str,
        seat_class: SeatClass,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        if let Some(seat) = state.seats.iter_mut().find(|s| {
            s.flight_id == flight_id && s.seat_number == seat_number && s.seat_class == seat_class
        }) {
            seat.is_available = true;
            seat.booking_id = None;
        }
        Ok(())
    }

    async fn record_payment_session(
        &self,
        booking_id: Uuid,
        session_id: &str,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        if let Some(booking) = state.bookings.get_mut(&booking_id) {
            booking.payment_session_id = Some(session_id.to_string());
        }
        Ok(())
    }

    async fn complete_booking(
        &self,
        booking_id: Uuid,
        payment_ref: &str,
    ) -> Result<bool, StoreError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_booking_updates {
            return Err(StoreError::WriteRejected("update refused".to_string()));
        }
        match state.bookings.get_mut(&booking_id) {
            Some(booking) => {
                booking.status = BookingStatus::Completed;
                booking.payment_ref = Some(payment_ref.to_string());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn find_booking_with_flight(
        &self,
        booking_id: Uuid,
    ) -> Result<Option<BookingDetails>, StoreError> {
        let state = self.state.lock().unwrap();
        let booking = match state.bookings.get(&booking_id) {
            Some(b) => b.clone(),
            None => return Ok(None),
        };
        let flight = state
            .flights
            .get(&booking.flight_id)
            .cloned()
            .ok_or_else(|| StoreError::WriteRejected("flight row missing".to_string()))?;
        Ok(Some(BookingDetails { booking, flight }))
    }

    async fn list_bookings_for_user(&self, user_id: Uuid) -> Result<Vec<BookingDetails>, StoreError> {
        let state = self.state.lock().unwrap();
        let mut bookings: Vec<Booking> = state
            .bookings
            .values()
            .filter(|b| b.user_id == Some(user_id))
            .cloned()
            .collect();
        bookings.sort_by_key(|b| std::cmp::Reverse(b.created_at));
        let mut details = Vec::with_capacity(bookings.len());
        for booking in bookings {
            let flight = state
                .flights
                .get(&booking.flight_id)
                .cloned()
                .ok_or_else(|| StoreError::WriteRejected("flight row missing".to_string()))?;
            details.push(BookingDetails { booking, flight });
        }
        Ok(details)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .users
            .iter()
            .find(|u| u.email == email && u.is_active)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_flight() -> Flight {
        Flight {
            id: Uuid::new_v4(),
            flight_number: "AB101".to_string(),
            origin: "SFO".to_string(),
            destination: "JFK".to_string(),
            departure_time: Utc.with_ymd_and_hms(2026, 9, 1, 8, 0, 0).unwrap(),
            arrival_time: Utc.with_ymd_and_hms(2026, 9, 1, 16, 30, 0).unwrap(),
            economy_capacity: 120,
            business_capacity: 24,
            economy_price: 299.99,
            business_price: 899.99,
        }
    }

    fn sample_seat(flight_id: Uuid, number: &str, class: SeatClass) -> Seat {
        Seat {
            id: Uuid::new_v4(),
            flight_id,
            seat_number: number.to_string(),
            seat_class: class,
            is_available: true,
            booking_id: None,
        }
    }

    #[tokio::test]
    async fn claim_seat_is_compare_and_swap() {
        let store = InMemoryStore::new();
        let flight = sample_flight();
        let flight_id = flight.id;
        store.add_flight(flight);
        store.add_seat(sample_seat(flight_id, "A1", SeatClass::Economy));

        let b1 = Uuid::new_v4();
        let b2 = Uuid::new_v4();
        assert!(store
            .claim_seat(flight_id, "A1", SeatClass::Economy, b1)
            .await
            .unwrap());
        // Second claim must observe the flipped flag and lose.
        assert!(!store
            .claim_seat(flight_id, "A1", SeatClass::Economy, b2)
            .await
            .unwrap());

        let seat = store.seat(flight_id, "A1", SeatClass::Economy).unwrap();
        assert!(!seat.is_available);
        assert_eq!(seat.booking_id, Some(b1));
    }

    #[tokio::test]
    async fn claim_respects_seat_class_scoping() {
        let store = InMemoryStore::new();
        let flight = sample_flight();
        let flight_id = flight.id;
        store.add_flight(flight);
        // Same seat number in both cabins must not alias.
        store.add_seat(sample_seat(flight_id, "1A", SeatClass::Economy));
        store.add_seat(sample_seat(flight_id, "1A", SeatClass::Business));

        let booking_id = Uuid::new_v4();
        assert!(store
            .claim_seat(flight_id, "1A", SeatClass::Business, booking_id)
            .await
            .unwrap());

        let economy = store.seat(flight_id, "1A", SeatClass::Economy).unwrap();
        assert!(economy.is_available);
    }

    #[tokio::test]
    async fn release_returns_seat_to_pool() {
        let store = InMemoryStore::new();
        let flight = sample_flight();
        let flight_id = flight.id;
        store.add_flight(flight);
        store.add_seat(sample_seat(flight_id, "A1", SeatClass::Economy));

        let booking_id = Uuid::new_v4();
        store
            .claim_seat(flight_id, "A1", SeatClass::Economy, booking_id)
            .await
            .unwrap();
        store
            .release_seat(flight_id, "A1", SeatClass::Economy)
            .await
            .unwrap();

        let seat = store.seat(flight_id, "A1", SeatClass::Economy).unwrap();
        assert!(seat.is_available);
        assert_eq!(seat.booking_id, None);
    }
}
