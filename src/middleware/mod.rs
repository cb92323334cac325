//! Request filters run by the gateway before forwarding

pub mod auth;
pub mod rate_limiter;
pub mod tenant;

pub use auth::{AuthFilter, PublicPaths};
pub use rate_limiter::RateLimitFilter;
pub use tenant::{TenantFilter, TenantResolver};
