//! Payment gateway client.
//!
//! The checkout provider is a black box: we create a hosted checkout session
//! for an amount plus metadata, the customer pays out-of-band, and we later
//! read the session back to learn whether it was paid. All network calls run
//! through a circuit breaker so a dead provider fails fast instead of tying
//! up request handlers on timeouts.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::{Duration, Instant};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::{CircuitBreakerConfig, PaymentConfig};

/* ---------- circuit breaker ---------- */

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Requests flow normally.
    Closed,
    /// Too many consecutive failures; requests are blocked until the timeout
    /// elapses.
    Open,
    /// One probe request is allowed through to test recovery.
    HalfOpen,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    state: RwLock<CircuitState>,
    failure_count: AtomicU32,
    last_failure: Mutex<Option<Instant>>,
    failure_threshold: u32,
    timeout: Duration,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, timeout_seconds: u64) -> Self {
        Self {
            state: RwLock::new(CircuitState::Closed),
            failure_count: AtomicU32::new(0),
            last_failure: Mutex::new(None),
            failure_threshold,
            timeout: Duration::from_secs(timeout_seconds),
        }
    }

    pub fn can_execute(&self) -> bool {
        let state = *self.state.read().unwrap();
        match state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let elapsed = self
                    .last_failure
                    .lock()
                    .unwrap()
                    .map(|t| t.elapsed())
                    .unwrap_or(Duration::MAX);
                if elapsed >= self.timeout {
                    *self.state.write().unwrap() = CircuitState::HalfOpen;
                    info!("Circuit breaker transitioning to HalfOpen");
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut state = self.state.write().unwrap();
        if *state == CircuitState::HalfOpen {
            info!("Circuit breaker recovered, closing");
        }
        *state = CircuitState::Closed;
        self.failure_count.store(0, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        let failures = self.failure_count.fetch_add(1, Ordering::Relaxed) + 1;
        *self.last_failure.lock().unwrap() = Some(Instant::now());

        let mut state = self.state.write().unwrap();
        match *state {
            CircuitState::Closed if failures >= self.failure_threshold => {
                *state = CircuitState::Open;
                error!(
                    "Circuit breaker OPENED after {} consecutive failures",
                    failures
                );
            }
            CircuitState::HalfOpen => {
                *state = CircuitState::Open;
                warn!("Circuit breaker probe failed, reopening");
            }
            _ => {}
        }
    }

    pub fn state(&self) -> CircuitState {
        *self.state.read().unwrap()
    }
}

/* ---------- gateway contract ---------- */

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("payment gateway temporarily unavailable")]
    CircuitOpen,
    #[error("payment gateway request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("payment gateway rejected the request: {0}")]
    Rejected(String),
    #[error("unknown checkout session: {0}")]
    UnknownSession(String),
}

/// Everything needed to open a hosted checkout session for one booking.
#[derive(Debug, Clone, Serialize)]
pub struct CheckoutRequest {
    /// Amount in the smallest currency unit.
    pub amount_minor: i64,
    pub currency: String,
    pub description: String,
    pub customer_email: String,
    pub success_url: String,
    pub cancel_url: String,
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    /// Redirect handle the client is sent to for payment.
    pub url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Paid,
    Unpaid,
    /// Any provider state that is not a settled payment.
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutSessionStatus {
    pub id: String,
    pub payment_status: PaymentStatus,
    /// Provider-side transaction reference, present once paid.
    pub payment_ref: Option<String>,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_checkout_session(
        &self,
        request: CheckoutRequest,
    ) -> Result<CheckoutSession, PaymentError>;

    async fn retrieve_session(
        &self,
        session_id: &str,
    ) -> Result<CheckoutSessionStatus, PaymentError>;
}

/* ---------- HTTP client ---------- */

#[derive(Debug, Deserialize)]
struct GatewayErrorBody {
    message: Option<String>,
}

/// reqwest-backed client for the checkout provider's JSON API.
#[derive(Clone)]
pub struct CheckoutClient {
    base_url: String,
    secret_key: String,
    http_client: reqwest::Client,
    circuit_breaker: Arc<CircuitBreaker>,
}

impl CheckoutClient {
    pub fn from_config(payment: &PaymentConfig, breaker: &CircuitBreakerConfig) -> Self {
        Self {
            base_url: payment.gateway_url.clone(),
            secret_key: payment.secret_key.clone(),
            http_client: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .expect("Failed to create HTTP client"),
            circuit_breaker: Arc::new(CircuitBreaker::new(
                breaker.failure_threshold,
                breaker.timeout_seconds,
            )),
        }
    }

    pub fn circuit_state(&self) -> CircuitState {
        self.circuit_breaker.state()
    }

    async fn execute<F, T>(&self, operation: F) -> Result<T, PaymentError>
    where
        F: std::future::Future<Output = Result<T, PaymentError>>,
    {
        if !self.circuit_breaker.can_execute() {
            warn!("Circuit breaker is OPEN, blocking payment gateway request");
            return Err(PaymentError::CircuitOpen);
        }

        match operation.await {
            Ok(result) => {
                self.circuit_breaker.record_success();
                Ok(result)
            }
            Err(e) => {
                error!("Payment gateway request failed: {}", e);
                self.circuit_breaker.record_failure();
                Err(e)
            }
        }
    }
}

#[async_trait]
impl PaymentGateway for CheckoutClient {
    async fn create_checkout_session(
        &self,
        request: CheckoutRequest,
    ) -> Result<CheckoutSession, PaymentError> {
        info!(
            "Creating checkout session: amount={} {}",
            request.amount_minor, request.currency
        );

        let operation = async {
            let response = self
                .http_client
                .post(format!("{}/v1/checkout/sessions", self.base_url))
                .bearer_auth(&self.secret_key)
                .json(&request)
                .send()
                .await?;

            if !response.status().is_success() {
                let body: GatewayErrorBody = response
                    .json()
                    .await
                    .unwrap_or(GatewayErrorBody { message: None });
                return Err(PaymentError::Rejected(
                    body.message.unwrap_or_else(|| "unknown error".to_string()),
                ));
            }

            Ok(response.json::<CheckoutSession>().await?)
        };

        self.execute(operation).await
    }

    async fn retrieve_session(
        &self,
        session_id: &str,
    ) -> Result<CheckoutSessionStatus, PaymentError> {
        info!("Retrieving checkout session {}", session_id);

        let operation = async {
            let response = self
                .http_client
                .get(format!(
                    "{}/v1/checkout/sessions/{}",
                    self.base_url, session_id
                ))
                .bearer_auth(&self.secret_key)
                .send()
                .await?;

            if response.status() == reqwest::StatusCode::NOT_FOUND {
                return Err(PaymentError::UnknownSession(session_id.to_string()));
            }
            if !response.status().is_success() {
                let body: GatewayErrorBody = response
                    .json()
                    .await
                    .unwrap_or(GatewayErrorBody { message: None });
                return Err(PaymentError::Rejected(
                    body.message.unwrap_or_else(|| "unknown error".to_string()),
                ));
            }

            Ok(response.json::<CheckoutSessionStatus>().await?)
        };

        self.execute(operation).await
    }
}

/* ---------- in-memory gateway for tests ---------- */

#[derive(Default)]
struct MemGatewayState {
    sessions: HashMap<String, (CheckoutRequest, PaymentStatus)>,
    next_id: u32,
    fail_on_create: bool,
}

/// In-memory payment gateway for exercising the booking workflow without a
/// provider.
#[derive(Clone, Default)]
pub struct InMemoryGateway {
    state: Arc<Mutex<MemGatewayState>>,
}

impl InMemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_on_create(&self, fail: bool) {
        self.state.lock().unwrap().fail_on_create = fail;
    }

    /// Simulates the customer completing payment out-of-band.
    pub fn mark_paid(&self, session_id: &str) {
        if let Some(entry) = self.state.lock().unwrap().sessions.get_mut(session_id) {
            entry.1 = PaymentStatus::Paid;
        }
    }

    pub fn session_count(&self) -> usize {
        self.state.lock().unwrap().sessions.len()
    }

    pub fn session_metadata(&self, session_id: &str) -> Option<HashMap<String, String>> {
        self.state
            .lock()
            .unwrap()
            .sessions
            .get(session_id)
            .map(|(req, _)| req.metadata.clone())
    }
}

#[async_trait]
impl PaymentGateway for InMemoryGateway {
    async fn create_checkout_session(
        &self,
        request: CheckoutRequest,
    ) -> Result<CheckoutSession, PaymentError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_on_create {
            return Err(PaymentError::Rejected(
                "session creation refused".to_string(),
            ));
        }
        state.next_id += 1;
        let id = format!("cs_test_{}_{}", state.next_id, Uuid::new_v4().simple());
        let url = format!("https://checkout.example.com/pay/{}", id);
        state
            .sessions
            .insert(id.clone(), (request, PaymentStatus::Unpaid));
        Ok(CheckoutSession { id, url })
    }

    async fn retrieve_session(
        &self,
        session_id: &str,
    ) -> Result<CheckoutSessionStatus, PaymentError> {
        let state = self.state.lock().unwrap();
        let (_, status) = state
            .sessions
            .get(session_id)
            .ok_or_else(|| PaymentError::UnknownSession(session_id.to_string()))?;
        Ok(CheckoutSessionStatus {
            id: session_id.to_string(),
            payment_status: *status,
            payment_ref: match status {
                PaymentStatus::Paid => Some(format!("pay_{}", session_id)),
                _ => None,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{bearer_token, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_client(base_url: &str, threshold: u32) -> CheckoutClient {
        CheckoutClient::from_config(
            &PaymentConfig {
                gateway_url: base_url.to_string(),
                secret_key: "sk_test_123".to_string(),
                currency: "usd".to_string(),
            },
            &CircuitBreakerConfig {
                failure_threshold: threshold,
                timeout_seconds: 60,
            },
        )
    }

    fn sample_request() -> CheckoutRequest {
        CheckoutRequest {
            amount_minor: 29999,
            currency: "usd".to_string(),
            description: "AB101 SFO to JFK - Seat A1 (ECONOMY)".to_string(),
            customer_email: "john@example.com".to_string(),
            success_url: "http://localhost:3000/booking-confirmation".to_string(),
            cancel_url: "http://localhost:3000/book/f1".to_string(),
            metadata: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn creates_session_against_gateway() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/checkout/sessions"))
            .and(bearer_token("sk_test_123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "cs_live_42",
                "url": "https://checkout.example.com/pay/cs_live_42"
            })))
            .mount(&server)
            .await;

        let client = test_client(&server.uri(), 5);
        let session = client
            .create_checkout_session(sample_request())
            .await
            .unwrap();
        assert_eq!(session.id, "cs_live_42");
        assert_eq!(client.circuit_state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn retrieves_paid_session_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/checkout/sessions/cs_live_42"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "cs_live_42",
                "payment_status": "paid",
                "payment_ref": "pay_987"
            })))
            .mount(&server)
            .await;

        let client = test_client(&server.uri(), 5);
        let status = client.retrieve_session("cs_live_42").await.unwrap();
        assert_eq!(status.payment_status, PaymentStatus::Paid);
        assert_eq!(status.payment_ref.as_deref(), Some("pay_987"));
    }

    #[tokio::test]
    async fn gateway_rejection_surfaces_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/checkout/sessions"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "message": "amount must be positive"
            })))
            .mount(&server)
            .await;

        let client = test_client(&server.uri(), 5);
        let err = client
            .create_checkout_session(sample_request())
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::Rejected(msg) if msg == "amount must be positive"));
    }

    #[tokio::test]
    async fn circuit_opens_after_threshold_and_blocks() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/checkout/sessions/cs_dead"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = test_client(&server.uri(), 2);
        for _ in 0..2 {
            let _ = client.retrieve_session("cs_dead").await;
        }
        assert_eq!(client.circuit_state(), CircuitState::Open);

        // Further calls are blocked without touching the network.
        let err = client.retrieve_session("cs_dead").await.unwrap_err();
        assert!(matches!(err, PaymentError::CircuitOpen));
    }

    #[tokio::test]
    async fn in_memory_gateway_round_trip() {
        let gateway = InMemoryGateway::new();
        let session = gateway
            .create_checkout_session(sample_request())
            .await
            .unwrap();

        let status = gateway.retrieve_session(&session.id).await.unwrap();
        assert_eq!(status.payment_status, PaymentStatus::Unpaid);

        gateway.mark_paid(&session.id);
        let status = gateway.retrieve_session(&session.id).await.unwrap();
        assert_eq!(status.payment_status, PaymentStatus::Paid);
        assert!(status.payment_ref.is_some());
    }
}
