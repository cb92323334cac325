//! HTTP handlers for the gateway surface

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{header, Request, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;

use crate::gateway::Gateway;
use crate::observability::{HealthChecker, HealthStatus, MetricsCollector};

/// Application state
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<Gateway>,
    pub health_checker: Arc<HealthChecker>,
    pub metrics: Arc<MetricsCollector>,
}

/// Every request that is not a gateway endpoint goes through the pipeline
pub async fn proxy(State(state): State<AppState>, request: Request<Body>) -> Response {
    // absent when the router is driven without a socket, e.g. in tests
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());

    state.gateway.handle(request, peer).await
}

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let health = state.health_checker.check_health().await;
    let status_code = match health.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Liveness probe - always 200
pub async fn liveness(State(state): State<AppState>) -> impl IntoResponse {
    let status = if state.health_checker.liveness() { "alive" } else { "dead" };
    (StatusCode::OK, Json(json!({ "status": status })))
}

pub async fn readiness(State(state): State<AppState>) -> impl IntoResponse {
    let health = state.health_checker.check_health().await;
    let (status_code, readiness) = match health.status {
        HealthStatus::Unhealthy => (StatusCode::SERVICE_UNAVAILABLE, "not_ready"),
        _ => (StatusCode::OK, "ready"),
    };

    (status_code, Json(json!({ "status": readiness, "details": health })))
}

/// Prometheus scrape endpoint
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.export_prometheus(),
    )
}
