//! Configuration for the edge gateway

use serde::{Deserialize, Serialize};
use secrecy::{ExposeSecret, Secret};
use std::collections::HashMap;
use std::path::Path;

pub mod loader;
pub mod validation;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    pub jwt: JwtConfig,

    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    #[serde(default)]
    pub auth: AuthConfig,

    /// Static route table
    #[serde(default = "default_routes")]
    pub routes: Vec<RouteConfig>,

    /// Backend name to base URL
    #[serde(default = "default_backends")]
    pub backends: HashMap<String, String>,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_server_host")]
    pub host: String,

    #[serde(default = "default_server_port")]
    pub port: u16,

    /// Maximum request body size in MB (0 = unlimited)
    #[serde(default = "default_max_body_size")]
    pub max_body_size_mb: usize,

    /// Use the first `X-Forwarded-For` entry as the client address.
    /// Only enable behind a proxy that sets it.
    #[serde(default)]
    pub trust_forwarded_for: bool,

    #[serde(default = "default_upstream_timeout")]
    pub upstream_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_server_host(),
            port: default_server_port(),
            max_body_size_mb: default_max_body_size(),
            trust_forwarded_for: false,
            upstream_timeout_secs: default_upstream_timeout(),
        }
    }
}

/// Token signing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtConfig {
    /// HMAC signing key (secured)
    #[serde(serialize_with = "serialize_secret", deserialize_with = "deserialize_secret")]
    pub secret: Secret<String>,

    #[serde(default = "default_access_ttl")]
    pub access_token_ttl_secs: u64,

    #[serde(default = "default_refresh_ttl")]
    pub refresh_token_ttl_secs: u64,
}

/// Backing store for rate-limit counters
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RateLimitStoreKind {
    Redis,
    #[default]
    Memory,
}

/// Rate limiting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Requests allowed per key per window
    #[serde(default = "default_rate_limit")]
    pub limit: u64,

    #[serde(default = "default_rate_window")]
    pub window_secs: u64,

    #[serde(default)]
    pub store: RateLimitStoreKind,

    /// Required when `store = "redis"`
    #[serde(default)]
    pub redis_url: Option<String>,

    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    /// Bound on one store call before the request fails open
    #[serde(default = "default_store_timeout")]
    pub store_timeout_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            limit: default_rate_limit(),
            window_secs: default_rate_window(),
            store: RateLimitStoreKind::default(),
            redis_url: None,
            key_prefix: default_key_prefix(),
            store_timeout_ms: default_store_timeout(),
        }
    }
}

/// Authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Path prefixes served without a credential
    #[serde(default = "default_public_paths")]
    pub public_paths: Vec<String>,

    /// Consult the revoked-token list after verification
    #[serde(default = "default_true")]
    pub check_revocation: bool,

    /// Bound on one revocation lookup before the token is treated as not revoked
    #[serde(default = "default_store_timeout")]
    pub revocation_timeout_ms: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            public_paths: default_public_paths(),
            check_revocation: true,
            revocation_timeout_ms: default_store_timeout(),
        }
    }
}

/// One entry of the route table
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RouteConfig {
    pub id: String,

    /// Path patterns; `/**` suffix matches the whole subtree
    pub paths: Vec<String>,

    /// Backend name resolved through `backends`
    pub backend: String,

    #[serde(default)]
    pub strip_prefix: usize,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// `json`, `compact` or `pretty`
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Backend services and the path prefixes each one owns
const SERVICES: [(&str, &[&str]); 8] = [
    ("user-service", &["users", "auth", "societies"]),
    ("visitor-service", &["visitors", "invites"]),
    ("maintenance-service", &["maintenance", "vendors"]),
    ("notification-service", &["notifications"]),
    ("analytics-service", &["analytics", "reports"]),
    ("audit-service", &["audit", "logs"]),
    ("payment-service", &["payments", "subscriptions", "billing"]),
    ("social-service", &["social", "posts", "messages"]),
];

// Default value functions
fn default_true() -> bool { true }
fn default_server_host() -> String { "0.0.0.0".to_string() }
fn default_server_port() -> u16 { 8080 }
fn default_max_body_size() -> usize { 10 }
fn default_upstream_timeout() -> u64 { 30 }
fn default_access_ttl() -> u64 { 86_400 } // 24 hours
fn default_refresh_ttl() -> u64 { 604_800 } // 7 days
fn default_rate_limit() -> u64 { 100 }
fn default_rate_window() -> u64 { 60 }
fn default_key_prefix() -> String { "rate_limit:".to_string() }
fn default_store_timeout() -> u64 { 250 }
fn default_log_level() -> String { "info".to_string() }
fn default_log_format() -> String { "json".to_string() }

fn default_public_paths() -> Vec<String> {
    [
        "/api/v1/auth/login",
        "/api/v1/auth/register",
        "/api/v1/auth/refresh",
        "/api/v1/auth/forgot-password",
        "/api/v1/auth/reset-password",
        "/api/v1/auth/verify-email",
        "/actuator",
        "/eureka",
        "/health",
    ]
    .iter()
    .map(|p| p.to_string())
    .collect()
}

fn default_routes() -> Vec<RouteConfig> {
    SERVICES
        .iter()
        .map(|(backend, prefixes)| RouteConfig {
            id: backend.to_string(),
            paths: prefixes
                .iter()
                .map(|p| format!("/api/v1/{}/**", p))
                .collect(),
            backend: backend.to_string(),
            strip_prefix: 0,
        })
        .collect()
}

fn default_backends() -> HashMap<String, String> {
    SERVICES
        .iter()
        .map(|(backend, _)| (backend.to_string(), format!("http://{}:8080", backend)))
        .collect()
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> crate::error::Result<Self> {
        let config = loader::load_config(path)?;
        validation::validate_config(&config)?;
        Ok(config)
    }

    /// Load configuration with environment variable overrides
    pub fn from_file_with_env<P: AsRef<Path>>(path: P) -> crate::error::Result<Self> {
        let config = loader::load_config_with_env(path)?;
        validation::validate_config(&config)?;
        Ok(config)
    }

    /// Validate this configuration
    pub fn validate(&self) -> crate::error::Result<()> {
        validation::validate_config(self)
    }

    /// Create default configuration; the signing key comes from `JWT_SECRET`
    pub fn default_config() -> Self {
        Self {
            server: ServerConfig::default(),
            jwt: JwtConfig {
                secret: Secret::new(std::env::var("JWT_SECRET").unwrap_or_default()),
                access_token_ttl_secs: default_access_ttl(),
                refresh_token_ttl_secs: default_refresh_ttl(),
            },
            rate_limit: RateLimitConfig::default(),
            auth: AuthConfig::default(),
            routes: default_routes(),
            backends: default_backends(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Custom serializer for Secret<String>
fn serialize_secret<S>(secret: &Secret<String>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_str(secret.expose_secret())
}

/// Custom deserializer for Secret<String>
fn deserialize_secret<'de, D>(deserializer: D) -> Result<Secret<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    Ok(Secret::new(s))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_route_table_covers_every_service() {
        let config = Config::default_config();
        assert_eq!(config.routes.len(), 8);
        assert_eq!(config.backends.len(), 8);

        let visitors = config.routes.iter().find(|r| r.id == "visitor-service").unwrap();
        assert_eq!(visitors.paths, vec!["/api/v1/visitors/**", "/api/v1/invites/**"]);
        assert_eq!(visitors.strip_prefix, 0);
        assert!(config.routes.iter().all(|r| config.backends.contains_key(&r.backend)));
    }

    #[test]
    fn test_rate_limit_defaults() {
        let config = RateLimitConfig::default();
        assert!(config.enabled);
        assert_eq!(config.limit, 100);
        assert_eq!(config.window_secs, 60);
        assert_eq!(config.store, RateLimitStoreKind::Memory);
        assert_eq!(config.key_prefix, "rate_limit:");
        assert_eq!(config.store_timeout_ms, 250);
    }

    #[test]
    fn test_public_paths_include_auth_endpoints() {
        let paths = AuthConfig::default().public_paths;
        assert!(paths.contains(&"/api/v1/auth/login".to_string()));
        assert!(paths.contains(&"/api/v1/auth/refresh".to_string()));
        assert!(!paths.iter().any(|p| p.starts_with("/api/v1/visitors")));
    }
}
