//! Claim set carried inside identity tokens

use serde::{Deserialize, Serialize};
use std::fmt;

/// Platform roles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    /// Platform super admin
    ProjectOwner,
    SocietyAdmin,
    SocietyWorker,
    Resident,
    /// Gate security staff
    Security,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::ProjectOwner => "PROJECT_OWNER",
            Role::SocietyAdmin => "SOCIETY_ADMIN",
            Role::SocietyWorker => "SOCIETY_WORKER",
            Role::Resident => "RESIDENT",
            Role::Security => "SECURITY",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Signed claim set
///
/// Access tokens carry the full profile; refresh tokens only carry the
/// registered claims (`sub`, `iat`, `exp`, `jti`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claims {
    /// User id
    pub sub: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,

    /// Tenant (society) the user belongs to
    #[serde(default, alias = "societyId", skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub permissions: Vec<String>,

    /// Issued at (unix seconds)
    pub iat: i64,

    /// Expires at (unix seconds)
    pub exp: i64,

    /// Unique token id
    pub jti: String,
}

/// Profile attributes embedded into access tokens at issue time
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Profile {
    pub email: String,
    pub role: Option<Role>,
    pub tenant_id: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub permissions: Vec<String>,
}

/// Access and refresh token issued together
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: &'static str,
    /// Access token lifetime in seconds
    pub expires_in: i64,
}
