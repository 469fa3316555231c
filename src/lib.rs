pub mod config;
pub mod controllers;
pub mod database;
pub mod middleware;
pub mod models;
pub mod services;
pub mod store;

use std::sync::Arc;

use services::booking::BookingOrchestrator;
use services::confirmation::ConfirmationReconciler;
use services::payment::PaymentGateway;
use store::DataStore;

// Shared state for the whole application. Built once at startup from
// injected gateway implementations and never mutated afterwards.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn DataStore>,
    pub orchestrator: BookingOrchestrator,
    pub reconciler: ConfirmationReconciler,
    pub config: config::Config,
}

impl AppState {
    pub fn new(
        store: Arc<dyn DataStore>,
        payments: Arc<dyn PaymentGateway>,
        config: config::Config,
    ) -> Arc<Self> {
        let orchestrator = BookingOrchestrator::new(
            store.clone(),
            payments.clone(),
            &config.app,
            &config.payment,
        );
        let reconciler = ConfirmationReconciler::new(store.clone(), payments);

        Arc::new(Self {
            store,
            orchestrator,
            reconciler,
            config,
        })
    }
}

/// Builds the application router over the given state.
pub fn app(state: Arc<AppState>) -> axum::Router {
    use axum::routing::get;
    use tower_http::trace::TraceLayer;

    axum::Router::new()
        .route("/", get(|| async { "Airbook API v1.0" }))
        .route("/health", get(|| async { "OK" }))
        .nest("/api", controllers::routes())
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
