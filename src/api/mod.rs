//! API module
//!
//! HTTP surfaces of both binaries: the authenticated gateway and the
//! store-side account service.

pub mod backend;
pub mod envelope;
pub mod middleware;
pub mod routes;

use axum::extract::DefaultBodyLimit;
use axum::{middleware as axum_middleware, routing::get, Router};

pub use backend::{create_backend_router, AccountServiceState};
pub use envelope::ApiResponse;
pub use routes::{create_router, GatewayState};

/// Gateway application: `/health` plus the authenticated account routes
pub fn gateway_app(state: GatewayState, max_request_body_bytes: usize) -> Router {
    // Layers run bottom-up: logging -> auth -> handler
    let protected_routes = create_router()
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::auth_middleware,
        ))
        .layer(axum_middleware::from_fn(middleware::logging_middleware))
        .layer(DefaultBodyLimit::max(max_request_body_bytes));

    Router::new()
        .route("/health", get(health_check))
        .merge(protected_routes)
        .with_state(state)
}

/// Account service application
pub fn account_service_app(state: AccountServiceState) -> Router {
    let routes = create_backend_router()
        .layer(axum_middleware::from_fn(middleware::context_middleware))
        .layer(axum_middleware::from_fn(middleware::logging_middleware));

    Router::new()
        .route("/health", get(health_check))
        .merge(routes)
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}
