//! Community Gateway - edge request pipeline for the residential community platform
//!
//! Every inbound request is matched against a static route table and passes a
//! fixed filter chain before it reaches a backend service:
//!
//! - **Rate limiting**: fixed-window counters in a shared store (Redis or
//!   in-process), failing open when the store is unavailable
//! - **Tenant resolution**: `X-Tenant-Id` header, host subdomain or `/society/{id}`
//! - **Authentication**: HS256 bearer tokens, revocation list, identity headers
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use community_gateway::prelude::*;
//! use std::sync::Arc;
//!
//! # fn main() -> Result<()> {
//! let config = Config::from_file("config.toml")?;
//! let tokens = Arc::new(TokenService::new(&config.jwt));
//!
//! let pair = tokens.issue("user-42", &Profile {
//!     email: "resident@acme.test".to_string(),
//!     role: Some(Role::Resident),
//!     tenant_id: Some("acme".to_string()),
//!     ..Profile::default()
//! })?;
//! let claims = tokens.verify(&pair.access_token)?;
//! assert_eq!(claims.sub, "user-42");
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod config;
pub mod error;
pub mod gateway;
pub mod middleware;
pub mod observability;
pub mod rate_limit;
pub mod shutdown;
pub mod token;

pub use config::Config;
pub use error::{GatewayError, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::error::{GatewayError, Result};
    pub use crate::gateway::{Gateway, HttpForwarder, RouteTable, StaticBackendLocator};
    pub use crate::middleware::{AuthFilter, PublicPaths, RateLimitFilter, TenantFilter, TenantResolver};
    pub use crate::observability::{HealthChecker, MetricsCollector};
    pub use crate::rate_limit::{InMemoryRateLimitStore, RateLimitStore, RateLimiter, RedisRateLimitStore};
    pub use crate::token::{Claims, Profile, Role, TokenPair, TokenService};
}
