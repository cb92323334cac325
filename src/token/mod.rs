//! Identity tokens: issuing, verification and revocation

pub mod claims;
pub mod revocation;
pub mod service;

pub use claims::{Claims, Profile, Role, TokenPair};
pub use revocation::{
    InMemoryRevocationList, RedisRevocationList, RevocationError, TokenRevocationList,
};
pub use service::TokenService;

/// Reasons a token fails verification or issuing
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("token is empty")]
    Empty,

    #[error("token is malformed")]
    Malformed,

    #[error("token uses an unsupported algorithm or format")]
    Unsupported,

    #[error("token signature does not verify")]
    BadSignature,

    #[error("token has expired")]
    Expired,

    #[error("token has been revoked")]
    Revoked,

    #[error("failed to sign token: {0}")]
    Signing(String),
}
