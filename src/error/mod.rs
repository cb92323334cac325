//! Error types for the edge gateway

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::rate_limit::RateLimitStoreError;
use crate::token::TokenError;

/// Result type alias for gateway operations
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Main error type for the gateway
///
/// Every filter rejection and dispatcher failure maps onto one variant; the
/// HTTP rendering lives in the [`IntoResponse`] impl below.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Missing Authorization header")]
    CredentialMissing,

    #[error("Invalid credential: {0}")]
    CredentialInvalid(#[from] TokenError),

    #[error("Rate limit exceeded: {limit} requests per {retry_after_secs}s window")]
    RateLimitExceeded { limit: u64, retry_after_secs: u64 },

    #[error("Rate limit store unavailable: {0}")]
    RateLimitStoreUnavailable(#[from] RateLimitStoreError),

    #[error("No route matches path: {0}")]
    RouteNotMatched(String),

    #[error("Backend unreachable: {0}")]
    BackendUnreachable(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// HTTP status produced for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::CredentialMissing | GatewayError::CredentialInvalid(_) => {
                StatusCode::UNAUTHORIZED
            }
            GatewayError::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            GatewayError::RouteNotMatched(_) => StatusCode::NOT_FOUND,
            GatewayError::BackendUnreachable(_) => StatusCode::BAD_GATEWAY,
            GatewayError::RateLimitStoreUnavailable(_)
            | GatewayError::Config(_)
            | GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code for the response body
    pub fn error_code(&self) -> &'static str {
        match self {
            GatewayError::CredentialMissing => "CREDENTIAL_MISSING",
            GatewayError::CredentialInvalid(_) => "CREDENTIAL_INVALID",
            GatewayError::RateLimitExceeded { .. } => "RATE_LIMIT_EXCEEDED",
            GatewayError::RateLimitStoreUnavailable(_) => "RATE_LIMIT_STORE_UNAVAILABLE",
            GatewayError::RouteNotMatched(_) => "ROUTE_NOT_FOUND",
            GatewayError::BackendUnreachable(_) => "BACKEND_UNREACHABLE",
            GatewayError::Config(_) | GatewayError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Client-facing message. Never carries the internal cause.
    fn public_message(&self) -> &'static str {
        match self {
            GatewayError::CredentialMissing => "Missing Authorization header",
            GatewayError::CredentialInvalid(_) => "Invalid or expired token",
            GatewayError::RateLimitExceeded { .. } => "Too many requests, please retry later",
            GatewayError::RouteNotMatched(_) => "No route found for request path",
            GatewayError::BackendUnreachable(_) => "Upstream service unavailable",
            GatewayError::RateLimitStoreUnavailable(_)
            | GatewayError::Config(_)
            | GatewayError::Internal(_) => "Internal gateway error",
        }
    }
}

/// JSON body returned for every gateway-produced rejection
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub success: bool,
    pub message: String,
    pub error: String,
    pub error_code: String,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let retry_after = match &self {
            GatewayError::RateLimitExceeded { retry_after_secs, .. } => Some(*retry_after_secs),
            _ => None,
        };

        let body = ErrorBody {
            success: false,
            message: self.public_message().to_string(),
            error: status
                .canonical_reason()
                .unwrap_or("Error")
                .to_string(),
            error_code: self.error_code().to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            retry_after,
        };

        let mut response = (status, Json(body)).into_response();

        if let GatewayError::RateLimitExceeded { limit, retry_after_secs } = self {
            let headers = response.headers_mut();
            headers.insert("x-ratelimit-limit", HeaderValue::from(limit));
            headers.insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs));
        }

        response
    }
}

impl From<config::ConfigError> for GatewayError {
    fn from(err: config::ConfigError) -> Self {
        GatewayError::Config(err.to_string())
    }
}
