//! AgePlane API Library
//!
//! Provisioning engine and HTTP surface for postgres-age-operator customer
//! instances. Exposed as a library for the server binary and integration tests.

// Core modules
pub mod config;
pub mod error;
pub mod validation;

// Application state
pub mod state;
pub use state::AppState;

// HTTP surface
pub mod handlers;
pub mod middleware;

// Provisioning engine
pub mod kubernetes;

// Operations
pub mod health;
pub mod logging;
pub mod shutdown;

use axum::{
    middleware as axum_middleware,
    routing::get,
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Customer routes, mounted under `/api/v1`
fn customer_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/customers",
            get(handlers::list_customers).post(handlers::create_customer),
        )
        .route(
            "/customers/:name",
            get(handlers::get_customer)
                .put(handlers::update_customer)
                .delete(handlers::delete_customer),
        )
        .route("/customers/:name/status", get(handlers::customer_status))
        .route("/docs", get(handlers::docs))
}

/// Public routes
fn public_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health_check))
        .route("/health/live", get(handlers::liveness_probe))
        .route("/health/ready", get(handlers::readiness_probe))
}

/// Build the full application router
pub fn build_router(state: Arc<AppState>) -> Router {
    let api = customer_routes().route_layer(axum_middleware::from_fn_with_state(
        state.clone(),
        middleware::auth::api_key_middleware,
    ));

    Router::new()
        .merge(public_routes())
        .nest("/api/v1", api)
        .with_state(state.clone())
        // Layers run bottom to top
        .layer(axum_middleware::from_fn_with_state(
            state,
            middleware::rate_limit::rate_limit_middleware,
        ))
        .layer(axum_middleware::from_fn(
            middleware::request_id::request_id_middleware,
        ))
        .layer(middleware::cors::CorsConfig::default().layer())
        .layer(TraceLayer::new_for_http())
}
