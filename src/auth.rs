//! Auth collaborator.
//!
//! Maps an opaque bearer credential to an owner identity. The lifecycle
//! components only ever see the resulting owner string.
//!
//! [`JwtVerifier`] accepts HS256 tokens whose claims carry the owner under
//! `user`, `username`, or `sub` (first present wins). `exp` is optional; if
//! present it must lie in the future.

use crate::error::{Error, Result};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::Deserialize;
use tracing::debug;

/// Resolves credentials to owner identities.
pub trait TokenVerifier: Send + Sync {
    /// Returns the owner for `token`, or [`Error::Unauthorized`].
    fn verify(&self, token: &str) -> Result<String>;
}

#[derive(Debug, Deserialize)]
struct OwnerClaims {
    #[serde(default)]
    user: Option<String>,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    sub: Option<String>,
}

impl OwnerClaims {
    fn owner(self) -> Option<String> {
        [self.user, self.username, self.sub]
            .into_iter()
            .flatten()
            .find(|owner| !owner.trim().is_empty())
    }
}

/// HS256 JWT verifier.
pub struct JwtVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl JwtVerifier {
    pub fn new(secret: &[u8]) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.required_spec_claims.clear();
        validation.validate_exp = true;

        Self {
            key: DecodingKey::from_secret(secret),
            validation,
        }
    }
}

impl TokenVerifier for JwtVerifier {
    fn verify(&self, token: &str) -> Result<String> {
        let data = decode::<OwnerClaims>(token, &self.key, &self.validation).map_err(|e| {
            debug!("rejected token: {}", e);
            Error::Unauthorized(format!("invalid token: {}", e))
        })?;

        data.claims
            .owner()
            .ok_or_else(|| Error::Unauthorized("token has no user claim".to_string()))
    }
}

/// Extracts the token from an `Authorization: Bearer <token>` value.
pub fn bearer_token(header: Option<&str>) -> Result<&str> {
    let value = header.ok_or_else(|| Error::Unauthorized("missing credentials".to_string()))?;
    let token = value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("bearer "))
        .map(str::trim)
        .unwrap_or_default();

    if token.is_empty() {
        return Err(Error::Unauthorized(
            "expected a bearer credential".to_string(),
        ));
    }
    Ok(token)
}
