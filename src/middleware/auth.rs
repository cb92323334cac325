//! Authentication filter

use axum::http::{header, HeaderValue};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{GatewayError, Result};
use crate::gateway::context::{headers, Identity};
use crate::gateway::RequestContext;
use crate::observability::MetricsCollector;
use crate::token::{Claims, RevocationError, TokenError, TokenRevocationList, TokenService};

const BEARER_PREFIX: &str = "Bearer ";

/// Default bound on one revocation lookup
pub const DEFAULT_REVOCATION_TIMEOUT: Duration = Duration::from_millis(250);

/// Allow-list of path prefixes that skip authentication
#[derive(Debug, Clone, Default)]
pub struct PublicPaths {
    prefixes: Vec<String>,
}

impl PublicPaths {
    pub fn new(prefixes: Vec<String>) -> Self {
        Self { prefixes }
    }

    pub fn is_public(&self, path: &str) -> bool {
        self.prefixes.iter().any(|prefix| path.starts_with(prefix.as_str()))
    }
}

/// Third stage of the chain
///
/// Verifies the bearer token and becomes the sole source of identity headers
/// on the forwarded request.
pub struct AuthFilter {
    tokens: Arc<TokenService>,
    public_paths: PublicPaths,
    revocation: Option<Arc<dyn TokenRevocationList>>,
    revocation_timeout: Duration,
    metrics: Option<Arc<MetricsCollector>>,
}

impl AuthFilter {
    pub fn new(tokens: Arc<TokenService>, public_paths: PublicPaths) -> Self {
        Self {
            tokens,
            public_paths,
            revocation: None,
            revocation_timeout: DEFAULT_REVOCATION_TIMEOUT,
            metrics: None,
        }
    }

    /// Consult a revocation list after a token verifies
    pub fn with_revocation(mut self, revocation: Arc<dyn TokenRevocationList>) -> Self {
        self.revocation = Some(revocation);
        self
    }

    /// Bound each revocation lookup; a lookup that runs over fails open
    pub fn with_revocation_timeout(mut self, timeout: Duration) -> Self {
        self.revocation_timeout = timeout;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub async fn apply(&self, ctx: &mut RequestContext) -> Result<()> {
        // client-supplied identity is never forwarded
        for name in headers::IDENTITY {
            ctx.remove_header(name);
        }

        if self.public_paths.is_public(ctx.path()) {
            debug!(path = %ctx.path(), "Public path, skipping authentication");
            return Ok(());
        }

        let token = Self::bearer_token(ctx)?;
        let claims = self.tokens.verify(&token).map_err(|e| {
            warn!(path = %ctx.path(), reason = %e, "Token verification failed");
            GatewayError::CredentialInvalid(e)
        })?;

        if self.is_revoked(&token).await {
            warn!(subject = %claims.sub, "Revoked token presented");
            return Err(GatewayError::CredentialInvalid(TokenError::Revoked));
        }

        Self::attach_identity(ctx, claims)
    }

    fn bearer_token(ctx: &RequestContext) -> Result<String> {
        let value = ctx
            .headers()
            .get(header::AUTHORIZATION)
            .ok_or(GatewayError::CredentialMissing)?;
        let value = value
            .to_str()
            .map_err(|_| GatewayError::CredentialInvalid(TokenError::Malformed))?;

        // without the scheme prefix the credential is unusable
        Ok(value
            .strip_prefix(BEARER_PREFIX)
            .unwrap_or_default()
            .to_string())
    }

    async fn is_revoked(&self, token: &str) -> bool {
        let Some(revocation) = &self.revocation else {
            return false;
        };

        let lookup = tokio::time::timeout(self.revocation_timeout, revocation.is_revoked(token))
            .await
            .unwrap_or(Err(RevocationError::Timeout(self.revocation_timeout)));

        match lookup {
            Ok(revoked) => revoked,
            Err(e) => {
                warn!(error = %e, "Revocation lookup failed, treating token as not revoked");
                if let Some(metrics) = &self.metrics {
                    metrics.record_revocation_error();
                }
                false
            }
        }
    }

    fn attach_identity(ctx: &mut RequestContext, claims: Claims) -> Result<()> {
        let invalid = |_| GatewayError::CredentialInvalid(TokenError::Malformed);

        ctx.set_header(headers::USER_ID, HeaderValue::from_str(&claims.sub).map_err(invalid)?);
        if let Some(email) = &claims.email {
            ctx.set_header(headers::USER_EMAIL, HeaderValue::from_str(email).map_err(invalid)?);
        }
        if let Some(role) = claims.role {
            ctx.set_header(headers::USER_ROLE, HeaderValue::from_static(role.as_str()));
        }
        if let Some(tenant) = &claims.tenant_id {
            let value = HeaderValue::from_str(tenant).map_err(invalid)?;
            ctx.set_header(headers::SOCIETY_ID, value.clone());
            ctx.set_header(headers::TENANT_ID, value);
            ctx.tenant_id = Some(tenant.clone());
        }

        debug!(subject = %claims.sub, role = ?claims.role, "Request authenticated");

        ctx.identity = Some(Identity {
            user_id: claims.sub,
            email: claims.email,
            role: claims.role,
            tenant_id: claims.tenant_id,
        });
        Ok(())
    }
}
