//! Router-level tests for the booking workflow, driven through the HTTP
//! surface with in-memory gateway implementations.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use base64::{engine::general_purpose, Engine as _};
use chrono::{TimeZone, Utc};
use tower::ServiceExt;
use uuid::Uuid;

use airbook::config::{
    AppConfig, CircuitBreakerConfig, Config, DatabaseConfig, PaymentConfig,
};
use airbook::models::{Flight, Seat, SeatClass, User};
use airbook::services::payment::InMemoryGateway;
use airbook::store::InMemoryStore;
use airbook::{app, AppState};

fn test_config() -> Config {
    Config {
        app: AppConfig {
            host: "0.0.0.0".to_string(),
            port: 8000,
            environment: "test".to_string(),
            rust_log: "debug".to_string(),
            site_url: "http://localhost:3000".to_string(),
        },
        database: DatabaseConfig {
            url: "postgres://unused".to_string(),
            pool_size: 1,
        },
        payment: PaymentConfig {
            gateway_url: "http://unused".to_string(),
            secret_key: "sk_test".to_string(),
            currency: "usd".to_string(),
        },
        circuit_breaker: CircuitBreakerConfig {
            failure_threshold: 5,
            timeout_seconds: 60,
        },
    }
}

struct TestApp {
    router: axum::Router,
    store: InMemoryStore,
    gateway: InMemoryGateway,
    flight_id: Uuid,
}

fn setup() -> TestApp {
    let store = InMemoryStore::new();
    let gateway = InMemoryGateway::new();

    let flight = Flight {
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
    };
    let flight_id = flight.id;
    store.add_flight(flight);
    for number in ["A1", "A2"] {
        store.add_seat(Seat {
            id: Uuid::new_v4(),
            flight_id,
            seat_number: number.to_string(),
            seat_class: SeatClass::Economy,
            is_available: true,
            booking_id: None,
        });
    }

    let state = AppState::new(
        Arc::new(store.clone()),
        Arc::new(gateway.clone()),
        test_config(),
    );

    TestApp {
        router: app(state),
        store,
        gateway,
        flight_id,
    }
}

fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn booking_payload(flight_id: Uuid, seat: &str, email: &str) -> serde_json::Value {
    serde_json::json!({
        "flight_id": flight_id,
        "seat_number": seat,
        "seat_class": "economy",
        "passenger_name": "John Doe",
        "passenger_email": email,
        "price": 299.99
    })
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_check() {
    let test = setup();
    let response = test
        .router
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn flight_search_returns_seeded_flight() {
    let test = setup();
    let response = test
        .router
        .oneshot(
            Request::builder()
                .uri("/api/flights?origin=SFO&destination=JFK")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body.as_array().unwrap().len(), 1);
    assert_eq!(body[0]["flight_number"], "AB101");
}

#[tokio::test]
async fn end_to_end_booking_and_confirmation() {
    let test = setup();

    // Reserve A1 as a guest.
    let response = test
        .router
        .clone()
        .oneshot(post_json(
            "/api/bookings",
            booking_payload(test.flight_id, "A1", "john@example.com"),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let body = json_body(response).await;
    let booking_id: Uuid = serde_json::from_value(body["booking_id"].clone()).unwrap();
    let session_id = body["session_id"].as_str().unwrap().to_string();
    assert!(body["session_url"].as_str().unwrap().starts_with("https://"));

    // The seat is now held by the booking.
    let seat = test
        .store
        .seat(test.flight_id, "A1", SeatClass::Economy)
        .unwrap();
    assert!(!seat.is_available);
    assert_eq!(seat.booking_id, Some(booking_id));

    // Unpaid confirmation attempt is rejected without mutation.
    let response = test
        .router
        .clone()
        .oneshot(post_json(
            "/api/bookings/confirm",
            serde_json::json!({ "booking_id": booking_id, "session_id": session_id }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
    let body = json_body(response).await;
    assert_eq!(body["error"], "Payment not completed");

    // Customer pays; confirmation now completes the booking.
    test.gateway.mark_paid(&session_id);
    let response = test
        .router
        .clone()
        .oneshot(post_json(
            "/api/bookings/confirm",
            serde_json::json!({ "booking_id": booking_id, "session_id": session_id }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["booking"]["booking"]["status"], "completed");
    assert_eq!(body["booking"]["flight"]["flight_number"], "AB101");

    // Reloading the confirmation page is harmless.
    let response = test
        .router
        .oneshot(post_json(
            "/api/bookings/confirm",
            serde_json::json!({ "booking_id": booking_id, "session_id": session_id }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn taken_seat_returns_conflict() {
    let test = setup();

    let response = test
        .router
        .clone()
        .oneshot(post_json(
            "/api/bookings",
            booking_payload(test.flight_id, "A1", "john@example.com"),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = test
        .router
        .oneshot(post_json(
            "/api/bookings",
            booking_payload(test.flight_id, "A1", "jane@example.com"),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = json_body(response).await;
    assert_eq!(body["error"], "Seat no longer available");
}

#[tokio::test]
async fn invalid_payload_is_rejected() {
    let test = setup();
    let response = test
        .router
        .oneshot(post_json(
            "/api/bookings",
            booking_payload(test.flight_id, "A1", "not-an-email"),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn my_bookings_requires_auth_and_lists_owned_rows() {
    let test = setup();

    // Unauthenticated access is refused.
    let response = test
        .router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/bookings")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    test.store.add_user(User {
        id: Uuid::new_v4(),
        email: "john@example.com".to_string(),
        password_hash: bcrypt::hash("secret", 4).unwrap(),
        full_name: "John Doe".to_string(),
        is_active: true,
        created_at: Utc::now(),
    });
    let credentials = general_purpose::STANDARD.encode("john@example.com:secret");

    // Book a seat while authenticated, then list it back.
    let mut request = post_json(
        "/api/bookings",
        booking_payload(test.flight_id, "A2", "john@example.com"),
    );
    request.headers_mut().insert(
        header::AUTHORIZATION,
        format!("Basic {}", credentials).parse().unwrap(),
    );
    let response = test.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = test
        .router
        .oneshot(
            Request::builder()
                .uri("/api/bookings")
                .header(header::AUTHORIZATION, format!("Basic {}", credentials))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    let bookings = body.as_array().unwrap();
    assert_eq!(bookings.len(), 1);
    assert_eq!(bookings[0]["booking"]["seat_number"], "A2");
}
