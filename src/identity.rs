//! Bearer credential verification.
//!
//! Credentials are HS256 JWTs signed with the portal's shared secret.
//! A verified token yields an [`Identity`]: the caller's id and role.
//! Role `admin` unlocks usage stats and cross-user history reads.

use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdentityError {
    /// No credential was presented.
    #[error("Access token required")]
    Unauthenticated,

    /// A credential was presented but is invalid or expired.
    #[error("Invalid or expired token")]
    Forbidden,

    #[error("Failed to sign token: {0}")]
    Signing(String),
}

/// Portal user roles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Farmer,
    Laborer,
    Retailer,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Farmer => "farmer",
            Self::Laborer => "laborer",
            Self::Retailer => "retailer",
            Self::Admin => "admin",
        }
    }
}

/// Verified identity carried by a bearer credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub id: String,
    pub role: Role,
}

impl Identity {
    pub fn new(id: impl Into<String>, role: Role) -> Self {
        Self {
            id: id.into(),
            role,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    #[serde(alias = "userId")]
    id: String,
    #[serde(default)]
    role: Role,
    exp: i64,
}

/// Verifies (and, for tooling and tests, issues) bearer credentials.
#[derive(Clone)]
pub struct IdentityVerifier {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl IdentityVerifier {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_required_spec_claims(&["exp"]);
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    /// Verify a bearer credential. `None` or an empty string means no credential.
    pub fn verify(&self, token: Option<&str>) -> Result<Identity, IdentityError> {
        let token = token
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(IdentityError::Unauthenticated)?;

        let data = decode::<Claims>(token, &self.decoding, &self.validation).map_err(|e| {
            tracing::debug!(error = %e, "Bearer token rejected");
            IdentityError::Forbidden
        })?;

        if data.claims.id.is_empty() {
            return Err(IdentityError::Forbidden);
        }

        Ok(Identity {
            id: data.claims.id,
            role: data.claims.role,
        })
    }

    /// Sign a credential for `identity` valid for `ttl`.
    pub fn issue(&self, identity: &Identity, ttl: chrono::Duration) -> Result<String, IdentityError> {
        self.issue_until(identity, Utc::now() + ttl)
    }

    /// Sign a credential for `identity` that expires at `expires_at`.
    pub fn issue_until(
        &self,
        identity: &Identity,
        expires_at: DateTime<Utc>,
    ) -> Result<String, IdentityError> {
        let claims = Claims {
            id: identity.id.clone(),
            role: identity.role,
            exp: expires_at.timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| IdentityError::Signing(e.to_string()))
    }
}
