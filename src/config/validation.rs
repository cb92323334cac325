//! Configuration validation

use std::collections::{HashMap, HashSet};

use super::*;
use crate::error::{GatewayError, Result};

/// Minimum HMAC key length for HS256
pub const MIN_SECRET_BYTES: usize = 32;

/// Validate complete configuration
pub fn validate_config(config: &Config) -> Result<()> {
    validate_server_config(&config.server)?;
    validate_jwt_config(&config.jwt)?;
    validate_rate_limit_config(&config.rate_limit)?;
    validate_routes(&config.routes, &config.backends)?;
    Ok(())
}

fn invalid(message: impl Into<String>) -> GatewayError {
    GatewayError::Config(message.into())
}

/// Validate server configuration
pub fn validate_server_config(config: &ServerConfig) -> Result<()> {
    if config.port == 0 {
        return Err(invalid("Server port cannot be 0"));
    }

    if config.host.is_empty() {
        return Err(invalid("Server host cannot be empty"));
    }

    if config.upstream_timeout_secs == 0 {
        return Err(invalid("Upstream timeout must be greater than 0"));
    }

    Ok(())
}

/// Validate token signing configuration
fn validate_jwt_config(config: &JwtConfig) -> Result<()> {
    let secret = config.secret.expose_secret();
    if secret.is_empty() {
        return Err(invalid("JWT secret is required"));
    }

    if secret.len() < MIN_SECRET_BYTES {
        return Err(invalid(format!(
            "JWT secret must be at least {} bytes",
            MIN_SECRET_BYTES
        )));
    }

    if config.access_token_ttl_secs == 0 || config.refresh_token_ttl_secs == 0 {
        return Err(invalid("Token TTLs must be greater than 0"));
    }

    if config.refresh_token_ttl_secs < config.access_token_ttl_secs {
        return Err(invalid("Refresh token TTL cannot be shorter than access token TTL"));
    }

    Ok(())
}

/// Validate rate limiting configuration
fn validate_rate_limit_config(config: &RateLimitConfig) -> Result<()> {
    if config.limit == 0 {
        return Err(invalid("Rate limit must be greater than 0"));
    }

    if config.window_secs == 0 {
        return Err(invalid("Rate limit window must be greater than 0"));
    }

    if config.store_timeout_ms == 0 {
        return Err(invalid("Rate limit store timeout must be greater than 0"));
    }

    if config.store == RateLimitStoreKind::Redis
        && config.redis_url.as_deref().map_or(true, str::is_empty)
    {
        return Err(invalid("redis_url is required when the rate limit store is redis"));
    }

    Ok(())
}

/// Validate the route table against the backend map
fn validate_routes(routes: &[RouteConfig], backends: &HashMap<String, String>) -> Result<()> {
    let mut ids = HashSet::new();

    for route in routes {
        if !ids.insert(route.id.as_str()) {
            return Err(invalid(format!("Duplicate route id: {}", route.id)));
        }

        if route.paths.is_empty() {
            return Err(invalid(format!("Route {} has no paths", route.id)));
        }

        if let Some(path) = route.paths.iter().find(|p| !p.starts_with('/')) {
            return Err(invalid(format!("Route {} path must start with '/': {}", route.id, path)));
        }

        if !backends.contains_key(&route.backend) {
            return Err(invalid(format!(
                "Route {} targets unknown backend {}",
                route.id, route.backend
            )));
        }
    }

    Ok(())
}
