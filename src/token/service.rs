//! Token issuing and verification

use chrono::{Duration, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use secrecy::ExposeSecret;
use tracing::{debug, error};
use uuid::Uuid;

use super::{Claims, Profile, TokenError, TokenPair};
use crate::config::JwtConfig;

/// Issues and verifies HS256-signed identity tokens
///
/// Key material is derived once from configuration and never changes for the
/// lifetime of the service.
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenService {
    /// Create a token service from JWT configuration
    pub fn new(config: &JwtConfig) -> Self {
        let secret = config.secret.expose_secret().as_bytes();

        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.leeway = 0;

        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
            access_ttl: Duration::seconds(config.access_token_ttl_secs as i64),
            refresh_ttl: Duration::seconds(config.refresh_token_ttl_secs as i64),
        }
    }

    /// Issue an access and refresh token for a subject
    pub fn issue(&self, subject: &str, profile: &Profile) -> Result<TokenPair, TokenError> {
        Ok(TokenPair {
            access_token: self.issue_access(subject, profile)?,
            refresh_token: self.issue_refresh(subject)?,
            token_type: "Bearer",
            expires_in: self.access_ttl.num_seconds(),
        })
    }

    /// Issue a short-lived access token carrying the full profile
    pub fn issue_access(&self, subject: &str, profile: &Profile) -> Result<String, TokenError> {
        let now = Utc::now();
        let claims = Claims {
            sub: subject.to_string(),
            email: Some(profile.email.clone()),
            role: profile.role,
            tenant_id: profile.tenant_id.clone(),
            first_name: profile.first_name.clone(),
            last_name: profile.last_name.clone(),
            permissions: profile.permissions.clone(),
            iat: now.timestamp(),
            exp: (now + self.access_ttl).timestamp(),
            jti: Uuid::new_v4().to_string(),
        };
        self.sign(&claims)
    }

    /// Issue a long-lived refresh token
    pub fn issue_refresh(&self, subject: &str) -> Result<String, TokenError> {
        let now = Utc::now();
        let claims = Claims {
            sub: subject.to_string(),
            email: None,
            role: None,
            tenant_id: None,
            first_name: None,
            last_name: None,
            permissions: Vec::new(),
            iat: now.timestamp(),
            exp: (now + self.refresh_ttl).timestamp(),
            jti: Uuid::new_v4().to_string(),
        };
        self.sign(&claims)
    }

    /// Verify a token's signature and expiry and return its claims
    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(TokenError::Empty);
        }

        let claims = decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| {
                debug!("Token verification failed: {}", e);
                classify(e.kind())
            })?;

        // exp == now is already expired
        if Utc::now().timestamp() >= claims.exp {
            return Err(TokenError::Expired);
        }

        Ok(claims)
    }

    pub(crate) fn sign(&self, claims: &Claims) -> Result<String, TokenError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key).map_err(|e| {
            error!("Failed to encode token: {}", e);
            TokenError::Signing(e.to_string())
        })
    }
}

fn classify(kind: &ErrorKind) -> TokenError {
    match kind {
        ErrorKind::ExpiredSignature => TokenError::Expired,
        ErrorKind::InvalidSignature => TokenError::BadSignature,
        ErrorKind::InvalidAlgorithm
        | ErrorKind::InvalidAlgorithmName
        | ErrorKind::MissingAlgorithm => TokenError::Unsupported,
        _ => TokenError::Malformed,
    }
}
