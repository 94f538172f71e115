//! Bearer token extractor identifying the owning account.
//!
//! The identity backend issues HS256 JWTs; `sub` carries the owner id.
//!
//! ```ignore
//! async fn handler(OwnerAuth(owner): OwnerAuth) -> String {
//!     owner.owner_id
//! }
//! ```

use std::sync::Arc;

use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts},
};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};

use crate::config::AuthSettings;
use crate::error::ApiError;

/// Claims read from the owner's access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OwnerClaims {
    pub sub: String,
    pub exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<String>,
}

/// Authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnerContext {
    pub owner_id: String,
}

/// State required by the `OwnerAuth` extractor.
#[derive(Clone)]
pub struct AuthState {
    decoding_key: Arc<DecodingKey>,
    validation: Arc<Validation>,
}

impl AuthState {
    pub fn new(settings: &AuthSettings) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        match &settings.audience {
            Some(aud) => {
                validation.set_audience(&[aud]);
                validation.set_required_spec_claims(&["exp", "aud"]);
            }
            None => validation.validate_aud = false,
        }
        Self {
            decoding_key: Arc::new(DecodingKey::from_secret(settings.jwt_secret.as_bytes())),
            validation: Arc::new(validation),
        }
    }

    /// Validate a raw token and return the caller it identifies.
    pub fn verify(&self, token: &str) -> Result<OwnerContext, ApiError> {
        let claims = decode::<OwnerClaims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| {
                tracing::debug!(error = %e, "Failed to decode token");
                ApiError::unauthorized(format!("invalid token: {e}"))
            })?
            .claims;

        let owner_id = claims.sub.trim();
        if owner_id.is_empty() {
            return Err(ApiError::unauthorized("token has no subject"));
        }

        Ok(OwnerContext {
            owner_id: owner_id.to_string(),
        })
    }
}

/// Axum extractor that validates `Authorization: Bearer <jwt>`.
pub struct OwnerAuth(pub OwnerContext);

impl<S> FromRequestParts<S> for OwnerAuth
where
    S: Send + Sync,
    AuthState: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let auth_state = AuthState::from_ref(state);

        let header = parts
            .headers
            .get(AUTHORIZATION)
            .ok_or_else(|| ApiError::unauthorized("Missing Authorization header"))?
            .to_str()
            .map_err(|_| ApiError::unauthorized("Malformed Authorization header"))?;

        let token = header
            .strip_prefix("Bearer ")
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ApiError::unauthorized("Expected a Bearer token"))?;

        let owner = auth_state.verify(token)?;
        tracing::debug!(owner_id = %owner.owner_id, "Token validated");
        Ok(OwnerAuth(owner))
    }
}
