//! API route configuration

use axum::{routing::get, Router};
use tower::ServiceBuilder;
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};

use super::handlers::{self, AppState};

/// Build the gateway router
///
/// Health and metrics endpoints are served locally; everything else falls
/// through to the request pipeline.
pub fn build_router(state: AppState, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/health/live", get(handlers::liveness))
        .route("/health/ready", get(handlers::readiness))
        .route("/metrics", get(handlers::metrics))
        .fallback(handlers::proxy)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(RequestBodyLimitLayer::new(max_body_bytes)),
        )
        .with_state(state)
}
